//! Whole-grid invariant checks.
//!
//! Runs over a complete entry set, independent of how it was produced. The
//! service uses it after every generation run and before accepting a manual
//! edit. Detects:
//! - Batch, faculty or room double-booking in one slot
//! - Faculty daily and weekly overload
//! - Subjects placed more often than their credits
//! - Faculty teaching three consecutive periods
//! - A batch with two labs back to back
//! - Sessions whose kind disagrees with the subject's lab flag
//! - References to unknown batches, faculty, rooms or subjects

use itertools::Itertools;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::data::{Batch, Day, Period, Roster, Shift, TimetableEntry};

pub type ValidationResult = Result<(), Vec<Violation>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Rule {
    BatchSlot,
    FacultySlot,
    RoomSlot,
    DailyLoad,
    WeeklyLoad,
    CreditOverrun,
    ThreeInARow,
    BackToBackLab,
    SessionKind,
    UnknownReference,
}

/// One broken rule, with a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule: Rule,
    pub message: String,
}

impl Violation {
    fn new(rule: Rule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.rule, self.message)
    }
}

/// Batch, faculty and room double-bookings. This is the uniqueness backstop a
/// store applies before accepting an entry set.
pub fn slot_conflicts(entries: &[TimetableEntry]) -> Vec<Violation> {
    let mut errors = Vec::new();
    let batch_slots = entries.iter().map(|e| (e.batch.as_str(), e.day, e.period)).counts();
    for ((batch, day, period), n) in batch_slots.into_iter().filter(|(_, n)| *n > 1).sorted() {
        errors.push(Violation::new(
            Rule::BatchSlot,
            format!("{batch} has {n} sessions on {day} {period}"),
        ));
    }
    let faculty_slots = entries
        .iter()
        .flat_map(|e| e.session.faculty_tokens().map(move |f| (f, e.day, e.period)))
        .counts();
    for ((faculty, day, period), n) in faculty_slots.into_iter().filter(|(_, n)| *n > 1).sorted() {
        errors.push(Violation::new(
            Rule::FacultySlot,
            format!("{faculty} is booked {n} times on {day} {period}"),
        ));
    }
    let room_slots = entries
        .iter()
        .flat_map(|e| e.session.room_tokens().map(move |r| (r, e.day, e.period)))
        .counts();
    for ((room, day, period), n) in room_slots.into_iter().filter(|(_, n)| *n > 1).sorted() {
        errors.push(Violation::new(
            Rule::RoomSlot,
            format!("{room} is booked {n} times on {day} {period}"),
        ));
    }
    errors
}

/// Checks every grid invariant over `entries` and returns all violations found.
pub fn validate_entries(
    entries: &[TimetableEntry],
    roster: &Roster,
    batches: &[Batch],
) -> ValidationResult {
    let mut errors = Vec::new();
    // The first listing of a batch name is the one that gets scheduled.
    let mut batch_map: HashMap<&str, &Batch> = HashMap::new();
    for b in batches {
        batch_map.entry(b.name.as_str()).or_insert(b);
    }

    // References
    for e in entries {
        match batch_map.get(e.batch.as_str()) {
            None => errors.push(Violation::new(
                Rule::UnknownReference,
                format!("entry {} belongs to unknown batch {}", e.id, e.batch),
            )),
            Some(b) if b.shift.position(e.period).is_none() => errors.push(Violation::new(
                Rule::UnknownReference,
                format!("entry {}: {} is not a period of {}", e.id, e.period, e.batch),
            )),
            Some(_) => {}
        }
        for a in e.session.assignments() {
            if roster.faculty(&a.faculty).is_none() {
                errors.push(Violation::new(
                    Rule::UnknownReference,
                    format!("entry {}: unknown faculty {}", e.id, a.faculty),
                ));
            }
            if roster.room(&a.room).is_none() {
                errors.push(Violation::new(
                    Rule::UnknownReference,
                    format!("entry {}: unknown room {}", e.id, a.room),
                ));
            }
            match roster.subject(&e.batch, &a.subject) {
                None => errors.push(Violation::new(
                    Rule::UnknownReference,
                    format!("entry {}: {} is not a subject of {}", e.id, a.subject, e.batch),
                )),
                Some(s) if s.is_lab != e.session.is_lab() => errors.push(Violation::new(
                    Rule::SessionKind,
                    format!(
                        "entry {}: {} is {} but booked as a {} session",
                        e.id,
                        a.subject,
                        if s.is_lab { "a lab" } else { "theory" },
                        if e.session.is_lab() { "lab" } else { "theory" },
                    ),
                )),
                Some(_) => {}
            }
        }
    }

    errors.extend(slot_conflicts(entries));

    // Faculty load
    let busy: HashMap<&str, HashSet<(Day, Period)>> = entries
        .iter()
        .flat_map(|e| e.session.faculty_tokens().map(move |f| (f, (e.day, e.period))))
        .into_group_map()
        .into_iter()
        .map(|(f, slots)| (f, slots.into_iter().collect()))
        .collect();
    for (name, slots) in busy.iter().sorted_by_key(|(name, _)| **name) {
        let Some(faculty) = roster.faculty(name) else {
            continue;
        };
        if slots.len() as u32 > faculty.max_hours_per_week {
            errors.push(Violation::new(
                Rule::WeeklyLoad,
                format!(
                    "{name} teaches {} periods a week (max {})",
                    slots.len(),
                    faculty.max_hours_per_week
                ),
            ));
        }
        for (day, n) in slots.iter().map(|(d, _)| *d).counts().into_iter().sorted() {
            if n as u32 > faculty.max_hours_per_day {
                errors.push(Violation::new(
                    Rule::DailyLoad,
                    format!(
                        "{name} teaches {n} periods on {day} (max {})",
                        faculty.max_hours_per_day
                    ),
                ));
            }
        }
    }

    // Credits
    let placed = entries
        .iter()
        .flat_map(|e| {
            e.session
                .assignments()
                .into_iter()
                .map(move |a| (e.batch.as_str(), a.subject.as_str()))
        })
        .counts();
    for ((batch, subject), n) in placed.into_iter().sorted() {
        if let Some(s) = roster.subject(batch, subject) {
            if n as u32 > s.demand_units() {
                errors.push(Violation::new(
                    Rule::CreditOverrun,
                    format!(
                        "{subject} for {batch} placed {n} times (credits {})",
                        s.demand_units()
                    ),
                ));
            }
        }
    }

    // Consecutive periods
    let shifts: Vec<Shift> = batches.iter().map(|b| b.shift).unique().collect();
    for (name, slots) in busy.iter().sorted_by_key(|(name, _)| **name) {
        for shift in &shifts {
            for day in Day::ALL {
                let run = shift
                    .periods()
                    .windows(3)
                    .find(|w| w.iter().all(|p| slots.contains(&(day, *p))));
                if let Some(w) = run {
                    errors.push(Violation::new(
                        Rule::ThreeInARow,
                        format!("{name} teaches {} to {} without a break on {day}", w[0], w[2]),
                    ));
                }
            }
        }
    }

    // Lab-ness follows the subjects, whatever kind the session claims.
    let labs: HashSet<(&str, Day, Period)> = entries
        .iter()
        .filter(|e| {
            e.session.is_lab()
                || e.session.assignments().iter().any(|a| {
                    roster
                        .subject(&e.batch, &a.subject)
                        .is_some_and(|s| s.is_lab)
                })
        })
        .map(|e| (e.batch.as_str(), e.day, e.period))
        .collect();
    for batch in batches {
        for day in Day::ALL {
            for pair in batch.shift.periods().windows(2) {
                if labs.contains(&(batch.name.as_str(), day, pair[0]))
                    && labs.contains(&(batch.name.as_str(), day, pair[1]))
                {
                    errors.push(Violation::new(
                        Rule::BackToBackLab,
                        format!("{} has labs at {} and {} on {day}", batch.name, pair[0], pair[1]),
                    ));
                }
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Assignment, Faculty, MORNING_PERIODS, Room, RoomKind, Session, Subject};
    use std::time::SystemTime;

    fn roster() -> Roster {
        Roster {
            faculty: vec![
                Faculty {
                    name: "Rao".into(),
                    subjects: vec!["Maths".into(), "C Lab".into()],
                    batch_assignments: vec!["B1".into()],
                    availability: vec![],
                    max_hours_per_day: 2,
                    max_hours_per_week: 3,
                },
                Faculty {
                    name: "Iyer".into(),
                    subjects: vec!["Java Lab".into()],
                    batch_assignments: vec!["B1".into()],
                    availability: vec![],
                    max_hours_per_day: 4,
                    max_hours_per_week: 20,
                },
            ],
            subjects: vec![
                Subject {
                    name: "Maths".into(),
                    semester: 1,
                    credits: 2,
                    is_lab: false,
                    students: 60,
                    batch: "B1".into(),
                },
                Subject {
                    name: "C Lab".into(),
                    semester: 1,
                    credits: 2,
                    is_lab: true,
                    students: 60,
                    batch: "B1".into(),
                },
                Subject {
                    name: "Java Lab".into(),
                    semester: 1,
                    credits: 2,
                    is_lab: true,
                    students: 60,
                    batch: "B1".into(),
                },
            ],
            rooms: ["T1", "L1", "L2"]
                .into_iter()
                .map(|n| Room {
                    name: n.into(),
                    capacity: 60,
                    kind: if n.starts_with('L') { RoomKind::Lab } else { RoomKind::Theory },
                })
                .collect(),
        }
    }

    fn batches() -> Vec<Batch> {
        vec![Batch {
            name: "B1".into(),
            semester: 1,
            shift: Shift::Morning,
        }]
    }

    fn entry(id: u64, day: Day, p: usize, session: Session) -> TimetableEntry {
        TimetableEntry {
            id,
            day,
            period: MORNING_PERIODS[p],
            batch: "B1".into(),
            session,
            created_at: SystemTime::now(),
        }
    }

    fn a(subject: &str, faculty: &str, room: &str) -> Assignment {
        Assignment {
            subject: subject.into(),
            faculty: faculty.into(),
            room: room.into(),
        }
    }

    fn rules(result: ValidationResult) -> Vec<Rule> {
        result.unwrap_err().into_iter().map(|v| v.rule).collect()
    }

    #[test]
    fn clean_grid_passes() {
        let entries = vec![
            entry(1, Day::Monday, 0, Session::Theory(a("Maths", "Rao", "T1"))),
            entry(
                2,
                Day::Monday,
                2,
                Session::PairedLab {
                    first: a("C Lab", "Rao", "L1"),
                    second: a("Java Lab", "Iyer", "L2"),
                },
            ),
        ];
        assert_eq!(validate_entries(&entries, &roster(), &batches()), Ok(()));
    }

    #[test]
    fn paired_tokens_collide_with_single_sessions() {
        let entries = vec![
            entry(
                1,
                Day::Monday,
                2,
                Session::PairedLab {
                    first: a("C Lab", "Rao", "L1"),
                    second: a("Java Lab", "Iyer", "L2"),
                },
            ),
            entry(2, Day::Monday, 2, Session::Theory(a("Maths", "Iyer", "L2"))),
        ];
        let found = rules(validate_entries(&entries, &roster(), &batches()));
        assert!(found.contains(&Rule::BatchSlot));
        assert!(found.contains(&Rule::FacultySlot));
        assert!(found.contains(&Rule::RoomSlot));
    }

    #[test]
    fn load_credit_and_adjacency_rules() {
        let entries = vec![
            entry(1, Day::Monday, 0, Session::Lab(a("C Lab", "Rao", "L1"))),
            entry(2, Day::Monday, 1, Session::Lab(a("C Lab", "Rao", "L1"))),
            entry(3, Day::Monday, 2, Session::Theory(a("Maths", "Rao", "T1"))),
            entry(4, Day::Tuesday, 0, Session::Lab(a("C Lab", "Rao", "L1"))),
        ];
        let found = rules(validate_entries(&entries, &roster(), &batches()));
        assert!(found.contains(&Rule::DailyLoad));
        assert!(found.contains(&Rule::WeeklyLoad));
        assert!(found.contains(&Rule::CreditOverrun));
        assert!(found.contains(&Rule::ThreeInARow));
        assert!(found.contains(&Rule::BackToBackLab));
    }

    #[test]
    fn lab_subject_booked_as_theory_is_still_a_lab() {
        let entries = vec![
            entry(1, Day::Monday, 0, Session::Lab(a("C Lab", "Rao", "L1"))),
            entry(2, Day::Monday, 1, Session::Theory(a("Java Lab", "Iyer", "L2"))),
        ];
        let found = rules(validate_entries(&entries, &roster(), &batches()));
        assert!(found.contains(&Rule::SessionKind));
        assert!(found.contains(&Rule::BackToBackLab));
    }

    #[test]
    fn theory_subject_booked_as_lab_is_refused() {
        let entries = vec![
            entry(1, Day::Monday, 0, Session::Lab(a("Maths", "Rao", "T1"))),
            entry(
                2,
                Day::Tuesday,
                2,
                Session::PairedLab {
                    first: a("C Lab", "Rao", "L1"),
                    second: a("Maths", "Iyer", "L2"),
                },
            ),
        ];
        let found = rules(validate_entries(&entries, &roster(), &batches()));
        assert_eq!(found, vec![Rule::SessionKind; 2]);
    }

    #[test]
    fn unknown_names_are_reported() {
        let entries = vec![entry(1, Day::Friday, 4, Session::Theory(a("Art", "Ghost", "Z9")))];
        let found = rules(validate_entries(&entries, &roster(), &batches()));
        assert_eq!(found, vec![Rule::UnknownReference; 3]);
    }
}
