mod config;
mod data;
mod error;
mod server;
mod service;
mod solver;
mod store;
mod validation;

use log::{error, info};
use std::sync::Arc;

use config::Config;
use service::TimetableService;
use store::{JsonFileStore, MemoryRoster, MemoryStore, RosterSource, TimetableStore};

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_filter.as_str()),
    )
    .init();

    let roster: Arc<dyn RosterSource> = match &config.roster_path {
        Some(path) => match MemoryRoster::load(path) {
            Ok(roster) => Arc::new(roster),
            Err(e) => {
                error!("Failed to load roster from {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => Arc::new(MemoryRoster::default()),
    };
    let store: Arc<dyn TimetableStore> = match &config.store_path {
        Some(path) => {
            info!("Persisting timetable to {}", path.display());
            Arc::new(JsonFileStore::new(path))
        }
        None => Arc::new(MemoryStore::default()),
    };

    let bind_addr = config.bind_addr.clone();
    let service = Arc::new(TimetableService::new(config, roster, store));
    if let Err(e) = server::run_server(&bind_addr, service).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
