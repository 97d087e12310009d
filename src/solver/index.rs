use log::trace;
use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use crate::data::{Day, EntryId, Period, Session, TimetableEntry};
use crate::error::EngineError;

/// Per-run occupancy state shared by every batch of the run.
///
/// Faculty load is indexed; room and batch occupancy are answered by scanning
/// the committed entries.
#[derive(Debug, Default)]
pub struct ResourceIndex {
    entries: Vec<TimetableEntry>,
    faculty_busy: HashMap<String, BTreeMap<Day, Vec<Period>>>,
    faculty_weekly: HashMap<String, u32>,
    next_id: EntryId,
}

impl ResourceIndex {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> &[TimetableEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TimetableEntry> {
        self.entries
    }

    pub fn is_faculty_free(&self, faculty: &str, day: Day, period: Period) -> bool {
        self.faculty_busy
            .get(faculty)
            .and_then(|days| days.get(&day))
            .is_none_or(|periods| !periods.contains(&period))
    }

    pub fn faculty_daily_count(&self, faculty: &str, day: Day) -> u32 {
        self.faculty_busy
            .get(faculty)
            .and_then(|days| days.get(&day))
            .map_or(0, |periods| periods.len() as u32)
    }

    pub fn faculty_weekly_count(&self, faculty: &str) -> u32 {
        self.faculty_weekly.get(faculty).copied().unwrap_or(0)
    }

    pub fn is_room_free(&self, room: &str, day: Day, period: Period) -> bool {
        !self
            .entries
            .iter()
            .any(|e| e.day == day && e.period == period && e.session.uses_room(room))
    }

    pub fn batch_entry_at(&self, batch: &str, day: Day, period: Period) -> Option<&TimetableEntry> {
        self.entries
            .iter()
            .find(|e| e.batch == batch && e.day == day && e.period == period)
    }

    pub fn is_batch_slot_free(&self, batch: &str, day: Day, period: Period) -> bool {
        self.batch_entry_at(batch, day, period).is_none()
    }

    pub fn batch_day_total(&self, batch: &str, day: Day) -> usize {
        self.entries
            .iter()
            .filter(|e| e.batch == batch && e.day == day)
            .count()
    }

    /// Entries of `batch` on `day` that cover `subject`, paired labs included.
    pub fn subject_day_count(&self, batch: &str, subject: &str, day: Day) -> usize {
        self.entries
            .iter()
            .filter(|e| e.batch == batch && e.day == day && e.session.covers_subject(subject))
            .count()
    }

    pub fn batch_lab_count(&self, batch: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.batch == batch && e.session.is_lab())
            .count()
    }

    pub fn placed_units(&self, batch: &str, subject: &str) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.batch == batch && e.session.covers_subject(subject))
            .count() as u32
    }

    /// Records a new entry. Slot, faculty and room collisions here mean the
    /// checker approved something it should not have.
    pub fn commit(
        &mut self,
        batch: &str,
        day: Day,
        period: Period,
        session: Session,
    ) -> Result<&TimetableEntry, EngineError> {
        if !self.is_batch_slot_free(batch, day, period) {
            return Err(EngineError::InvariantViolation {
                rule: "batch slot",
                detail: format!("{batch} already has a session on {day} {period}"),
            });
        }
        if let Some(f) = session.faculty_tokens().find(|f| !self.is_faculty_free(f, day, period)) {
            return Err(EngineError::InvariantViolation {
                rule: "faculty slot",
                detail: format!("{f} is already teaching on {day} {period}"),
            });
        }
        if let Some(r) = session.room_tokens().find(|r| !self.is_room_free(r, day, period)) {
            return Err(EngineError::InvariantViolation {
                rule: "room slot",
                detail: format!("{r} is already occupied on {day} {period}"),
            });
        }

        for faculty in session.faculty_tokens() {
            self.faculty_busy
                .entry(faculty.to_string())
                .or_default()
                .entry(day)
                .or_default()
                .push(period);
            *self.faculty_weekly.entry(faculty.to_string()).or_insert(0) += 1;
        }

        let entry = TimetableEntry {
            id: self.next_id,
            day,
            period,
            batch: batch.to_string(),
            session,
            created_at: SystemTime::now(),
        };
        self.next_id += 1;
        trace!("Committed entry {} for {}: {} {} {}", entry.id, batch, day, period, entry.session);
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }
}
