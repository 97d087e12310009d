use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use log::{error, info};
use serde_json::json;
use std::sync::Arc;

use crate::data::{EntryId, Faculty, Room, RunSummary, Subject, TimetableEntry};
use crate::error::{GenerateError, StoreError};
use crate::service::{EditOptions, EntryEdit, TimetableService};
use crate::store::EntryFilter;

type AppState = Arc<TimetableService>;

/// JSON error body with a status code.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "message": self.1 }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::Duplicate { .. } => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

impl From<GenerateError> for ApiError {
    fn from(e: GenerateError) -> Self {
        let status = match &e {
            GenerateError::RunInProgress => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

async fn add_faculty(
    State(svc): State<AppState>,
    Json(faculty): Json<Faculty>,
) -> Result<Json<Faculty>, ApiError> {
    svc.roster().add_faculty(faculty.clone())?;
    Ok(Json(faculty))
}

async fn add_subject(
    State(svc): State<AppState>,
    Json(subject): Json<Subject>,
) -> Result<Json<Subject>, ApiError> {
    svc.roster().add_subject(subject.clone())?;
    Ok(Json(subject))
}

async fn add_room(
    State(svc): State<AppState>,
    Json(room): Json<Room>,
) -> Result<Json<Room>, ApiError> {
    svc.roster().add_room(room.clone())?;
    Ok(Json(room))
}

async fn generate_handler(State(svc): State<AppState>) -> Result<Json<RunSummary>, ApiError> {
    let summary = tokio::task::spawn_blocking(move || svc.generate())
        .await
        .map_err(task_failed)??;
    Ok(Json(summary))
}

fn task_failed(e: tokio::task::JoinError) -> ApiError {
    error!("Blocking task failed: {e}");
    ApiError(StatusCode::INTERNAL_SERVER_ERROR, "task failed".to_string())
}

async fn timetable_handler(
    State(svc): State<AppState>,
    Query(filter): Query<EntryFilter>,
) -> Result<Json<Vec<TimetableEntry>>, ApiError> {
    Ok(Json(svc.timetable(&filter)?))
}

async fn options_handler(State(svc): State<AppState>) -> Result<Json<EditOptions>, ApiError> {
    Ok(Json(svc.options()?))
}

async fn edit_handler(
    State(svc): State<AppState>,
    Path(id): Path<EntryId>,
    Json(edit): Json<EntryEdit>,
) -> Result<Json<TimetableEntry>, ApiError> {
    let entry = tokio::task::spawn_blocking(move || svc.edit_entry(id, edit))
        .await
        .map_err(task_failed)??;
    Ok(Json(entry))
}

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/api/faculty", post(add_faculty))
        .route("/api/subject", post(add_subject))
        .route("/api/room", post(add_room))
        .route("/api/timetable", get(timetable_handler))
        .route("/api/timetable/generate", post(generate_handler))
        .route("/api/timetable/options", get(options_handler))
        .route("/api/timetable/:id", put(edit_handler))
        .with_state(service)
}

pub async fn run_server(bind_addr: &str, service: AppState) -> std::io::Result<()> {
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}
