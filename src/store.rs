//! Roster and timetable persistence.

use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::data::{EntryId, Faculty, Room, Roster, Subject, TimetableEntry};
use crate::error::StoreError;
use crate::validation::slot_conflicts;

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

/// Source of the faculty, subject and room records a run reads.
pub trait RosterSource: Send + Sync {
    fn list_faculty(&self) -> Result<Vec<Faculty>, StoreError>;
    fn list_subjects(&self) -> Result<Vec<Subject>, StoreError>;
    fn list_rooms(&self) -> Result<Vec<Room>, StoreError>;

    fn add_faculty(&self, faculty: Faculty) -> Result<(), StoreError>;
    fn add_subject(&self, subject: Subject) -> Result<(), StoreError>;
    fn add_room(&self, room: Room) -> Result<(), StoreError>;

    /// A full copy of the current roster.
    fn snapshot(&self) -> Result<Roster, StoreError> {
        Ok(Roster {
            faculty: self.list_faculty()?,
            subjects: self.list_subjects()?,
            rooms: self.list_rooms()?,
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryRoster {
    inner: RwLock<Roster>,
}

impl MemoryRoster {
    pub fn new(roster: Roster) -> Self {
        Self {
            inner: RwLock::new(roster),
        }
    }

    /// Loads a roster JSON document (`{"faculty": [...], "subjects": [...], "rooms": [...]}`).
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let roster: Roster = serde_json::from_str(&fs::read_to_string(path)?)?;
        info!(
            "Loaded roster from {}: {} faculty, {} subjects, {} rooms",
            path.display(),
            roster.faculty.len(),
            roster.subjects.len(),
            roster.rooms.len()
        );
        Ok(Self::new(roster))
    }
}

impl RosterSource for MemoryRoster {
    fn list_faculty(&self) -> Result<Vec<Faculty>, StoreError> {
        Ok(self.inner.read().map_err(poisoned)?.faculty.clone())
    }

    fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        Ok(self.inner.read().map_err(poisoned)?.subjects.clone())
    }

    fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.inner.read().map_err(poisoned)?.rooms.clone())
    }

    fn add_faculty(&self, faculty: Faculty) -> Result<(), StoreError> {
        let mut roster = self.inner.write().map_err(poisoned)?;
        if roster.faculty(&faculty.name).is_some() {
            return Err(StoreError::Duplicate {
                kind: "faculty",
                name: faculty.name,
            });
        }
        roster.faculty.push(faculty);
        Ok(())
    }

    fn add_subject(&self, subject: Subject) -> Result<(), StoreError> {
        let mut roster = self.inner.write().map_err(poisoned)?;
        if roster.subject(&subject.batch, &subject.name).is_some() {
            return Err(StoreError::Duplicate {
                kind: "subject",
                name: format!("{} ({})", subject.name, subject.batch),
            });
        }
        roster.subjects.push(subject);
        Ok(())
    }

    fn add_room(&self, room: Room) -> Result<(), StoreError> {
        let mut roster = self.inner.write().map_err(poisoned)?;
        if roster.room(&room.name).is_some() {
            return Err(StoreError::Duplicate {
                kind: "room",
                name: room.name,
            });
        }
        roster.rooms.push(room);
        Ok(())
    }
}

/// Optional filter for reading back persisted entries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryFilter {
    pub batch: Option<String>,
}

impl EntryFilter {
    fn apply(&self, entries: &[TimetableEntry]) -> Vec<TimetableEntry> {
        let mut selected: Vec<TimetableEntry> = entries
            .iter()
            .filter(|e| self.batch.as_ref().is_none_or(|b| *b == e.batch))
            .cloned()
            .collect();
        selected.sort_by(|a, b| (&a.batch, a.day, a.period).cmp(&(&b.batch, b.day, b.period)));
        selected
    }
}

/// Where generated grids live. `replace_all` is all-or-nothing.
pub trait TimetableStore: Send + Sync {
    fn replace_all(&self, entries: Vec<TimetableEntry>) -> Result<(), StoreError>;
    fn query(&self, filter: &EntryFilter) -> Result<Vec<TimetableEntry>, StoreError>;
    fn get(&self, id: EntryId) -> Result<TimetableEntry, StoreError>;
    fn update(&self, entry: TimetableEntry) -> Result<(), StoreError>;
}

fn check_unique(entries: &[TimetableEntry]) -> Result<(), StoreError> {
    let conflicts = slot_conflicts(entries);
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(StoreError::Conflict(conflicts))
    }
}

fn replace_one(
    entries: &[TimetableEntry],
    entry: TimetableEntry,
) -> Result<Vec<TimetableEntry>, StoreError> {
    let mut next = entries.to_vec();
    let slot = next
        .iter_mut()
        .find(|e| e.id == entry.id)
        .ok_or(StoreError::NotFound(entry.id))?;
    *slot = entry;
    check_unique(&next)?;
    Ok(next)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<TimetableEntry>>,
}

impl TimetableStore for MemoryStore {
    fn replace_all(&self, entries: Vec<TimetableEntry>) -> Result<(), StoreError> {
        check_unique(&entries)?;
        let mut current = self.entries.write().map_err(poisoned)?;
        *current = entries;
        debug!("Replaced in-memory timetable with {} entries", current.len());
        Ok(())
    }

    fn query(&self, filter: &EntryFilter) -> Result<Vec<TimetableEntry>, StoreError> {
        Ok(filter.apply(&self.entries.read().map_err(poisoned)?))
    }

    fn get(&self, id: EntryId) -> Result<TimetableEntry, StoreError> {
        self.entries
            .read()
            .map_err(poisoned)?
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn update(&self, entry: TimetableEntry) -> Result<(), StoreError> {
        let mut current = self.entries.write().map_err(poisoned)?;
        *current = replace_one(&current, entry)?;
        Ok(())
    }
}

/// Keeps the grid in a JSON file. Writes go to a sibling temp file which is
/// then renamed over the target.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<Vec<TimetableEntry>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &[TimetableEntry]) -> Result<(), StoreError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Wrote {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

impl TimetableStore for JsonFileStore {
    fn replace_all(&self, entries: Vec<TimetableEntry>) -> Result<(), StoreError> {
        check_unique(&entries)?;
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        self.write_all(&entries)
    }

    fn query(&self, filter: &EntryFilter) -> Result<Vec<TimetableEntry>, StoreError> {
        Ok(filter.apply(&self.read_all()?))
    }

    fn get(&self, id: EntryId) -> Result<TimetableEntry, StoreError> {
        self.read_all()?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    fn update(&self, entry: TimetableEntry) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let next = replace_one(&self.read_all()?, entry)?;
        self.write_all(&next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Assignment, Day, MORNING_PERIODS, RoomKind, Session};
    use std::time::SystemTime;

    fn entry(id: EntryId, batch: &str, p: usize, faculty: &str, room: &str) -> TimetableEntry {
        TimetableEntry {
            id,
            day: Day::Monday,
            period: MORNING_PERIODS[p],
            batch: batch.into(),
            session: Session::Theory(Assignment {
                subject: "Maths".into(),
                faculty: faculty.into(),
                room: room.into(),
            }),
            created_at: SystemTime::now(),
        }
    }

    fn exercise_atomic_replace(store: &dyn TimetableStore) {
        store
            .replace_all(vec![entry(1, "B1", 0, "Rao", "T1"), entry(2, "B2", 0, "Iyer", "T2")])
            .unwrap();

        // Same faculty twice in one slot: the whole set is refused.
        let err = store
            .replace_all(vec![entry(3, "B1", 1, "Rao", "T1"), entry(4, "B2", 1, "Rao", "T2")])
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let kept = store.query(&EntryFilter::default()).unwrap();
        assert_eq!(kept.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
        let b2 = EntryFilter {
            batch: Some("B2".into()),
        };
        assert_eq!(store.query(&b2).unwrap().len(), 1);
    }

    #[test]
    fn memory_store_replace_is_all_or_nothing() {
        exercise_atomic_replace(&MemoryStore::default());
    }

    #[test]
    fn json_store_replace_is_all_or_nothing() {
        let path =
            std::env::temp_dir().join(format!("timetable-store-{}.json", std::process::id()));
        let _ = fs::remove_file(&path);
        let store = JsonFileStore::new(&path);
        assert!(store.query(&EntryFilter::default()).unwrap().is_empty());
        exercise_atomic_replace(&store);
        assert!(path.exists());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn update_rejects_collisions_and_unknown_ids() {
        let store = MemoryStore::default();
        store
            .replace_all(vec![entry(1, "B1", 0, "Rao", "T1"), entry(2, "B2", 1, "Iyer", "T2")])
            .unwrap();

        let clash = entry(2, "B2", 0, "Iyer", "T1");
        assert!(matches!(store.update(clash), Err(StoreError::Conflict(_))));
        assert!(matches!(store.update(entry(9, "B1", 3, "X", "Y")), Err(StoreError::NotFound(9))));

        store.update(entry(2, "B2", 2, "Iyer", "T2")).unwrap();
        assert_eq!(store.get(2).unwrap().period, MORNING_PERIODS[2]);
    }

    #[test]
    fn roster_rejects_duplicates() {
        let roster = MemoryRoster::default();
        let room = Room {
            name: "L1".into(),
            capacity: 30,
            kind: RoomKind::Lab,
        };
        roster.add_room(room.clone()).unwrap();
        assert!(matches!(roster.add_room(room), Err(StoreError::Duplicate { kind: "room", .. })));

        let subject = Subject {
            name: "C Lab".into(),
            semester: 1,
            credits: 2,
            is_lab: true,
            students: 60,
            batch: "BCA 1 (M)".into(),
        };
        roster.add_subject(subject.clone()).unwrap();
        roster
            .add_subject(Subject {
                batch: "BCA 1 (E)".into(),
                ..subject.clone()
            })
            .unwrap();
        assert!(roster.add_subject(subject).is_err());
        assert_eq!(roster.snapshot().unwrap().subjects.len(), 2);
    }
}
