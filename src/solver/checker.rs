use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::fmt;

use super::grid::Slot;
use super::index::ResourceIndex;
use crate::data::{Batch, Faculty, Room, RoomKind, Roster, Semester, Session, Subject};

/// A theory subject may take at most this many slots of one batch's day.
pub const MAX_SUBJECT_PER_DAY: usize = 2;

/// Why a fully formed candidate was turned down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    SlotTaken,
    AdjacentLab,
    SubjectDayCap(String),
    Faculty(String, FacultyIssue),
    SameFaculty,
    RoomTaken(String),
    SameRoom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacultyIssue {
    Unknown,
    NotQualified,
    NotAssignedToBatch,
    Unavailable,
    Busy,
    DailyCap,
    WeeklyCap,
    ThreeInARow,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::SlotTaken => write!(f, "slot already used by the batch"),
            Rejection::AdjacentLab => write!(f, "lab would run back to back"),
            Rejection::SubjectDayCap(s) => write!(f, "{s} already twice that day"),
            Rejection::Faculty(name, issue) => write!(f, "faculty {name}: {issue:?}"),
            Rejection::SameFaculty => write!(f, "paired lab needs two faculty"),
            Rejection::RoomTaken(r) => write!(f, "room {r} occupied"),
            Rejection::SameRoom => write!(f, "paired lab needs two rooms"),
        }
    }
}

/// Feasibility queries for one batch against the run's current state.
pub struct ConstraintChecker<'a> {
    roster: &'a Roster,
    index: &'a ResourceIndex,
    semester_rooms: &'a BTreeMap<Semester, String>,
    batch: &'a Batch,
}

impl<'a> ConstraintChecker<'a> {
    pub fn new(
        roster: &'a Roster,
        index: &'a ResourceIndex,
        semester_rooms: &'a BTreeMap<Semester, String>,
        batch: &'a Batch,
    ) -> Self {
        Self {
            roster,
            index,
            semester_rooms,
            batch,
        }
    }

    /// Free for this batch, and for labs, not next to another lab of the batch.
    pub fn slot_open(&self, slot: &Slot, lab: bool) -> bool {
        self.index
            .is_batch_slot_free(&self.batch.name, slot.day, slot.period)
            && !(lab && self.lab_adjacent(slot))
    }

    fn lab_adjacent(&self, slot: &Slot) -> bool {
        let periods = self.batch.shift.periods();
        let neighbours = [
            slot.period_index.checked_sub(1),
            Some(slot.period_index + 1),
        ];
        neighbours
            .into_iter()
            .flatten()
            .filter_map(|i| periods.get(i))
            .filter_map(|p| self.index.batch_entry_at(&self.batch.name, slot.day, *p))
            .any(|e| e.session.is_lab())
    }

    pub fn under_day_cap(&self, subject: &str, slot: &Slot) -> bool {
        self.index
            .subject_day_count(&self.batch.name, subject, slot.day)
            < MAX_SUBJECT_PER_DAY
    }

    /// Checks one faculty member against every per-faculty rule for this slot.
    pub fn faculty_issue(
        &self,
        faculty: &Faculty,
        subject: &str,
        slot: &Slot,
    ) -> Option<FacultyIssue> {
        let (day, period) = (slot.day, slot.period);
        if !faculty.teaches(subject) {
            Some(FacultyIssue::NotQualified)
        } else if !faculty.serves(&self.batch.name) {
            Some(FacultyIssue::NotAssignedToBatch)
        } else if !faculty.is_available(day, period) {
            Some(FacultyIssue::Unavailable)
        } else if !self.index.is_faculty_free(&faculty.name, day, period) {
            Some(FacultyIssue::Busy)
        } else if self.index.faculty_daily_count(&faculty.name, day) >= faculty.max_hours_per_day {
            Some(FacultyIssue::DailyCap)
        } else if self.index.faculty_weekly_count(&faculty.name) >= faculty.max_hours_per_week {
            Some(FacultyIssue::WeeklyCap)
        } else if self.completes_three_in_a_row(&faculty.name, slot) {
            Some(FacultyIssue::ThreeInARow)
        } else {
            None
        }
    }

    /// True if teaching at `slot` would give the faculty three consecutive
    /// periods of this batch's template on that day.
    fn completes_three_in_a_row(&self, faculty: &str, slot: &Slot) -> bool {
        let periods = self.batch.shift.periods();
        let busy = |offset: isize| {
            slot.period_index
                .checked_add_signed(offset)
                .and_then(|i| periods.get(i))
                .is_some_and(|p| !self.index.is_faculty_free(faculty, slot.day, *p))
        };
        (busy(-2) && busy(-1)) || (busy(-1) && busy(1)) || (busy(1) && busy(2))
    }

    /// Every faculty member who could take `subject` at `slot`, in random order.
    pub fn faculty_candidates<R: Rng + ?Sized>(
        &self,
        subject: &str,
        slot: &Slot,
        rng: &mut R,
    ) -> Vec<&'a Faculty> {
        let mut candidates: Vec<&'a Faculty> = self
            .roster
            .faculty
            .iter()
            .filter(|f| self.faculty_issue(f, subject, slot).is_none())
            .collect();
        candidates.shuffle(rng);
        candidates
    }

    /// Semester room, then a room of the subject's kind, then anything free.
    pub fn theory_room(&self, subject: &Subject, slot: &Slot) -> Option<&'a Room> {
        let free = |r: &&'a Room| self.index.is_room_free(&r.name, slot.day, slot.period);
        let rooms: &'a [Room] = &self.roster.rooms;

        self.semester_rooms
            .get(&subject.semester)
            .and_then(|pref| {
                rooms
                    .iter()
                    .filter(|r| r.name.eq_ignore_ascii_case(pref))
                    .find(free)
            })
            .or_else(|| {
                rooms
                    .iter()
                    .filter(|r| r.kind == subject.room_kind())
                    .find(free)
            })
            .or_else(|| rooms.iter().find(free))
    }

    fn free_labs(&self, slot: &Slot) -> impl Iterator<Item = &'a Room> {
        self.roster.rooms.iter().filter(move |r| {
            r.kind == RoomKind::Lab && self.index.is_room_free(&r.name, slot.day, slot.period)
        })
    }

    pub fn lab_room(&self, slot: &Slot) -> Option<&'a Room> {
        self.free_labs(slot).next()
    }

    /// Two distinct free labs. Which one goes first alternates with the number
    /// of lab sessions the batch already has, spreading use across rooms.
    pub fn lab_room_pair(&self, slot: &Slot) -> Option<(&'a Room, &'a Room)> {
        let mut free = self.free_labs(slot);
        let (a, b) = (free.next()?, free.next()?);
        if self.index.batch_lab_count(&self.batch.name) % 2 == 0 {
            Some((a, b))
        } else {
            Some((b, a))
        }
    }

    /// Final gate on a fully formed session at `slot`.
    pub fn admits(&self, slot: &Slot, session: &Session) -> Result<(), Rejection> {
        if !self.index.is_batch_slot_free(&self.batch.name, slot.day, slot.period) {
            return Err(Rejection::SlotTaken);
        }
        if session.is_lab() && self.lab_adjacent(slot) {
            return Err(Rejection::AdjacentLab);
        }
        if let Session::Theory(a) = session {
            if !self.under_day_cap(&a.subject, slot) {
                return Err(Rejection::SubjectDayCap(a.subject.clone()));
            }
        }

        let assignments = session.assignments();
        if let &[first, second] = assignments.as_slice() {
            if first.faculty == second.faculty {
                return Err(Rejection::SameFaculty);
            }
            if first.room == second.room {
                return Err(Rejection::SameRoom);
            }
        }
        for a in assignments {
            let issue = match self.roster.faculty(&a.faculty) {
                None => Some(FacultyIssue::Unknown),
                Some(f) => self.faculty_issue(f, &a.subject, slot),
            };
            if let Some(issue) = issue {
                return Err(Rejection::Faculty(a.faculty.clone(), issue));
            }
            if !self.index.is_room_free(&a.room, slot.day, slot.period) {
                return Err(Rejection::RoomTaken(a.room.clone()));
            }
        }
        Ok(())
    }
}

/// Whether anyone at all could ever teach `subject` to `batch`.
pub fn has_qualified_faculty(roster: &Roster, subject: &str, batch: &str) -> bool {
    roster
        .faculty
        .iter()
        .any(|f| f.teaches(subject) && f.serves(batch))
}
