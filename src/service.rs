use log::{error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use crate::config::Config;
use crate::data::{
    Day, EntryId, GenerationOutput, Period, Roster, RunSummary, Session, TimetableEntry,
};
use crate::error::{EngineError, GenerateError, StoreError};
use crate::solver;
use crate::store::{EntryFilter, RosterSource, TimetableStore};
use crate::validation::validate_entries;

/// A manual change to one cell of the persisted grid.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryEdit {
    pub day: Day,
    pub period: Period,
    pub session: Session,
}

/// Names an editor can pick from.
#[derive(Debug, Clone, Serialize)]
pub struct EditOptions {
    pub faculty: Vec<String>,
    pub subjects: Vec<String>,
    pub rooms: Vec<String>,
}

/// Coordinates runs against the roster and the store. At most one run is in
/// flight at a time.
///
/// `grid_lock` is held from read to write by every change to the persisted
/// grid, so an edit always validates against the grid it ends up replacing.
pub struct TimetableService {
    config: Config,
    roster: Arc<dyn RosterSource>,
    store: Arc<dyn TimetableStore>,
    run_lock: Mutex<()>,
    grid_lock: Mutex<()>,
}

impl TimetableService {
    pub fn new(
        config: Config,
        roster: Arc<dyn RosterSource>,
        store: Arc<dyn TimetableStore>,
    ) -> Self {
        Self {
            config,
            roster,
            store,
            run_lock: Mutex::new(()),
            grid_lock: Mutex::new(()),
        }
    }

    // Both locks guard no data, so poisoning is harmless.
    fn lock_grid(&self) -> MutexGuard<'_, ()> {
        self.grid_lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn roster(&self) -> &dyn RosterSource {
        self.roster.as_ref()
    }

    /// One full run: snapshot, generate, validate, replace. A second caller
    /// while a run is active is turned away rather than queued.
    pub fn generate(&self) -> Result<RunSummary, GenerateError> {
        let _run = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(GenerateError::RunInProgress),
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };

        let snapshot = self.roster.snapshot()?;
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let output = solver::generate(
            &snapshot,
            &self.config.batches,
            &self.config.semester_rooms,
            &mut rng,
        )?;
        self.assemble(&snapshot, output)
    }

    /// Checks the run's grid as a whole, then swaps it in.
    fn assemble(
        &self,
        snapshot: &Roster,
        output: GenerationOutput,
    ) -> Result<RunSummary, GenerateError> {
        if let Err(violations) = validate_entries(&output.entries, snapshot, &self.config.batches) {
            for v in &violations {
                error!("Generated grid breaks an invariant: {v}");
            }
            let first = &violations[0];
            return Err(EngineError::InvariantViolation {
                rule: "grid validation",
                detail: first.to_string(),
            }
            .into());
        }

        for skipped in &output.summary.skipped {
            warn!("{skipped}");
        }
        for shortfall in &output.summary.shortfalls {
            warn!("{shortfall}");
        }

        let _grid = self.lock_grid();
        self.store.replace_all(output.entries)?;
        info!(
            "Timetable generated successfully ({} entries, {} units short)",
            output.summary.entries_committed, output.summary.dropped_units
        );
        Ok(output.summary)
    }

    pub fn timetable(&self, filter: &EntryFilter) -> Result<Vec<TimetableEntry>, StoreError> {
        self.store.query(filter)
    }

    /// Applies a manual edit only if the whole grid still satisfies every rule.
    pub fn edit_entry(&self, id: EntryId, edit: EntryEdit) -> Result<TimetableEntry, StoreError> {
        let _grid = self.lock_grid();
        let original = self.store.get(id)?;
        let current = self.store.query(&EntryFilter::default())?;
        let updated = TimetableEntry {
            day: edit.day,
            period: edit.period,
            session: edit.session,
            ..original
        };

        let candidate: Vec<TimetableEntry> = current
            .into_iter()
            .map(|e| if e.id == id { updated.clone() } else { e })
            .collect();
        let snapshot = self.roster.snapshot()?;
        validate_entries(&candidate, &snapshot, &self.config.batches)
            .map_err(StoreError::Conflict)?;

        self.store.update(updated.clone())?;
        info!("Entry {id} moved to {} {}: {}", updated.day, updated.period, updated.session);
        Ok(updated)
    }

    pub fn options(&self) -> Result<EditOptions, StoreError> {
        let roster = self.roster.snapshot()?;
        Ok(EditOptions {
            faculty: roster.faculty.into_iter().map(|f| f.name).collect(),
            subjects: roster.subjects.into_iter().map(|s| s.name).collect(),
            rooms: roster.rooms.into_iter().map(|r| r.name).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        Assignment, Batch, Faculty, MORNING_PERIODS, Room, RoomKind, Shift, Subject,
    };
    use crate::store::{MemoryRoster, MemoryStore};
    use std::thread;
    use std::time::{Duration, SystemTime};

    fn roster() -> Roster {
        Roster {
            faculty: vec![Faculty {
                name: "Rao".into(),
                subjects: vec!["Maths".into()],
                batch_assignments: vec!["B1".into()],
                availability: vec![],
                max_hours_per_day: 4,
                max_hours_per_week: 20,
            }],
            subjects: vec![Subject {
                name: "Maths".into(),
                semester: 1,
                credits: 3,
                is_lab: false,
                students: 60,
                batch: "B1".into(),
            }],
            rooms: vec![Room {
                name: "T1".into(),
                capacity: 60,
                kind: RoomKind::Theory,
            }],
        }
    }

    fn service(store: Arc<dyn TimetableStore>) -> TimetableService {
        service_with(roster(), store)
    }

    fn service_with(roster: Roster, store: Arc<dyn TimetableStore>) -> TimetableService {
        let config = Config {
            seed: Some(11),
            batches: vec![Batch {
                name: "B1".into(),
                semester: 1,
                shift: Shift::Morning,
            }],
            ..Config::default()
        };
        TimetableService::new(config, Arc::new(MemoryRoster::new(roster)), store)
    }

    /// Refuses every write, as an unreachable database would.
    struct BrokenStore;

    impl TimetableStore for BrokenStore {
        fn replace_all(&self, _: Vec<TimetableEntry>) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn query(&self, _: &EntryFilter) -> Result<Vec<TimetableEntry>, StoreError> {
            Ok(Vec::new())
        }
        fn get(&self, id: EntryId) -> Result<TimetableEntry, StoreError> {
            Err(StoreError::NotFound(id))
        }
        fn update(&self, _: TimetableEntry) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    /// A store whose reads are slow enough for concurrent edits to overlap.
    #[derive(Default)]
    struct SlowStore {
        inner: MemoryStore,
    }

    impl TimetableStore for SlowStore {
        fn replace_all(&self, entries: Vec<TimetableEntry>) -> Result<(), StoreError> {
            self.inner.replace_all(entries)
        }
        fn query(&self, filter: &EntryFilter) -> Result<Vec<TimetableEntry>, StoreError> {
            thread::sleep(Duration::from_millis(30));
            self.inner.query(filter)
        }
        fn get(&self, id: EntryId) -> Result<TimetableEntry, StoreError> {
            self.inner.get(id)
        }
        fn update(&self, entry: TimetableEntry) -> Result<(), StoreError> {
            self.inner.update(entry)
        }
    }

    #[test]
    fn generate_persists_the_grid() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store.clone());
        let summary = svc.generate().unwrap();
        assert_eq!(summary.entries_committed, 3);
        assert_eq!(summary.dropped_units, 0);
        let b1 = EntryFilter {
            batch: Some("B1".into()),
        };
        assert_eq!(store.query(&b1).unwrap().len(), 3);
    }

    #[test]
    fn persistence_failure_fails_the_run() {
        let svc = service(Arc::new(BrokenStore));
        assert!(matches!(svc.generate(), Err(GenerateError::Persistence(_))));
    }

    #[test]
    fn overlapping_run_is_rejected() {
        let svc = service(Arc::new(MemoryStore::default()));
        let _held = svc.run_lock.lock().unwrap();
        assert!(matches!(svc.generate(), Err(GenerateError::RunInProgress)));
    }

    #[test]
    fn edits_are_revalidated() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store.clone());
        svc.generate().unwrap();
        let entries = svc.timetable(&EntryFilter::default()).unwrap();
        let (first, second) = (&entries[0], &entries[1]);

        // Moving onto an occupied cell of the same batch is refused.
        let clash = EntryEdit {
            day: second.day,
            period: second.period,
            session: first.session.clone(),
        };
        assert!(matches!(svc.edit_entry(first.id, clash), Err(StoreError::Conflict(_))));

        // Unknown faculty is refused.
        let ghost = EntryEdit {
            day: first.day,
            period: first.period,
            session: Session::Theory(Assignment {
                subject: "Maths".into(),
                faculty: "Ghost".into(),
                room: "T1".into(),
            }),
        };
        assert!(svc.edit_entry(first.id, ghost).is_err());

        let free_day = Day::ALL
            .into_iter()
            .find(|d| entries.iter().all(|e| e.day != *d))
            .unwrap();
        let moved = svc
            .edit_entry(
                first.id,
                EntryEdit {
                    day: free_day,
                    period: first.period,
                    session: first.session.clone(),
                },
            )
            .unwrap();
        assert_eq!(store.get(first.id).unwrap().day, moved.day);
    }

    #[test]
    fn invalid_generated_grid_is_fatal_and_not_persisted() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store.clone());
        svc.generate().unwrap();
        let before = store.query(&EntryFilter::default()).unwrap();

        let cell = |id, room: &str| TimetableEntry {
            id,
            day: Day::Monday,
            period: MORNING_PERIODS[0],
            batch: "B1".into(),
            session: Session::Theory(Assignment {
                subject: "Maths".into(),
                faculty: "Rao".into(),
                room: room.into(),
            }),
            created_at: SystemTime::now(),
        };
        let output = GenerationOutput {
            entries: vec![cell(1, "T1"), cell(2, "T1")],
            summary: RunSummary::default(),
        };

        let err = svc.assemble(&roster(), output).unwrap_err();
        assert!(matches!(
            err,
            GenerateError::Engine(EngineError::InvariantViolation { .. })
        ));
        assert_eq!(store.query(&EntryFilter::default()).unwrap(), before);
    }

    #[test]
    fn concurrent_edits_see_each_other() {
        let mut roster = roster();
        roster.faculty[0].max_hours_per_day = 2;
        let svc = service_with(roster.clone(), Arc::new(SlowStore::default()));
        svc.generate().unwrap();
        let entries = svc.timetable(&EntryFilter::default()).unwrap();
        assert_eq!(
            entries.iter().map(|e| e.day).collect::<Vec<_>>(),
            vec![Day::Monday, Day::Tuesday, Day::Wednesday]
        );

        // Either move alone is fine; together Rao would teach three periods on Monday.
        let move_to = |entry: &TimetableEntry, p: usize| EntryEdit {
            day: Day::Monday,
            period: MORNING_PERIODS[p],
            session: entry.session.clone(),
        };
        let (a, b) = thread::scope(|s| {
            let a = s.spawn(|| svc.edit_entry(entries[1].id, move_to(&entries[1], 2)));
            let b = s.spawn(|| svc.edit_entry(entries[2].id, move_to(&entries[2], 4)));
            (a.join().unwrap(), b.join().unwrap())
        });

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert!(matches!(a.err().or(b.err()), Some(StoreError::Conflict(_))));
        let stored = svc.timetable(&EntryFilter::default()).unwrap();
        assert!(validate_entries(&stored, &roster, &svc.config.batches).is_ok());
    }

    #[test]
    fn options_list_roster_names() {
        let svc = service(Arc::new(MemoryStore::default()));
        let options = svc.options().unwrap();
        assert_eq!(options.faculty, vec!["Rao"]);
        assert_eq!(options.rooms, vec!["T1"]);
    }
}
