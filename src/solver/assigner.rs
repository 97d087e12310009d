use log::{debug, trace};
use rand::Rng;
use std::collections::BTreeMap;

use super::checker::ConstraintChecker;
use super::grid::Slot;
use super::index::ResourceIndex;
use super::pairing::LabPair;
use crate::data::{Assignment, Batch, EntryId, Roster, Semester, Session, Subject};
use crate::error::EngineError;

/// One weekly unit of demand waiting for a slot.
#[derive(Debug, Clone, Copy)]
pub enum DemandUnit<'s> {
    LabPair(&'s Subject, &'s Subject),
    SingleLab(&'s Subject),
    Theory(&'s Subject),
}

impl DemandUnit<'_> {
    fn is_lab(&self) -> bool {
        !matches!(self, DemandUnit::Theory(_))
    }

    pub fn describe(&self) -> String {
        match self {
            DemandUnit::LabPair(a, b) => format!("lab pair {} / {}", a.name, b.name),
            DemandUnit::SingleLab(s) => format!("single lab {}", s.name),
            DemandUnit::Theory(s) => format!("theory {}", s.name),
        }
    }
}

/// Terminal state of a unit after its single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Placed(EntryId),
    Dropped,
}

/// Resolves a planned lab pair into the batch's subject records.
pub fn resolve_pair<'s>(roster: &'s Roster, batch: &str, pair: &LabPair) -> Option<DemandUnit<'s>> {
    Some(DemandUnit::LabPair(
        roster.subject(batch, &pair.first)?,
        roster.subject(batch, &pair.second)?,
    ))
}

/// First-fit placement of demand units for one batch.
pub struct SlotAssigner<'a> {
    roster: &'a Roster,
    semester_rooms: &'a BTreeMap<Semester, String>,
    batch: &'a Batch,
    slots: &'a [Slot],
}

impl<'a> SlotAssigner<'a> {
    pub fn new(
        roster: &'a Roster,
        semester_rooms: &'a BTreeMap<Semester, String>,
        batch: &'a Batch,
        slots: &'a [Slot],
    ) -> Self {
        Self {
            roster,
            semester_rooms,
            batch,
            slots,
        }
    }

    /// The batch's free slots, lightest day first, then earliest period.
    fn ordered_free_slots(&self, index: &ResourceIndex) -> Vec<Slot> {
        let mut free: Vec<Slot> = self
            .slots
            .iter()
            .filter(|s| index.is_batch_slot_free(&self.batch.name, s.day, s.period))
            .copied()
            .collect();
        free.sort_by_key(|s| {
            (
                index.batch_day_total(&self.batch.name, s.day),
                s.period_index,
                s.day_index,
            )
        });
        free
    }

    /// Scans the ordered slots and commits the first feasible session. Never
    /// retries: a unit that fits nowhere is dropped.
    pub fn place<R: Rng + ?Sized>(
        &self,
        index: &mut ResourceIndex,
        unit: DemandUnit<'_>,
        rng: &mut R,
    ) -> Result<UnitOutcome, EngineError> {
        let found = {
            let checker =
                ConstraintChecker::new(self.roster, index, self.semester_rooms, self.batch);
            self.ordered_free_slots(index).into_iter().find_map(|slot| {
                let session = self.candidate(&checker, &slot, unit, rng)?;
                match checker.admits(&slot, &session) {
                    Ok(()) => Some((slot, session)),
                    Err(reason) => {
                        trace!(
                            "{} rejected at {} {}: {}",
                            unit.describe(),
                            slot.day,
                            slot.period,
                            reason
                        );
                        None
                    }
                }
            })
        };

        match found {
            Some((slot, session)) => {
                let entry = index.commit(&self.batch.name, slot.day, slot.period, session)?;
                Ok(UnitOutcome::Placed(entry.id))
            }
            None => {
                debug!("No slot fits {} for {}", unit.describe(), self.batch.name);
                Ok(UnitOutcome::Dropped)
            }
        }
    }

    fn candidate<R: Rng + ?Sized>(
        &self,
        checker: &ConstraintChecker<'_>,
        slot: &Slot,
        unit: DemandUnit<'_>,
        rng: &mut R,
    ) -> Option<Session> {
        if !checker.slot_open(slot, unit.is_lab()) {
            return None;
        }

        match unit {
            DemandUnit::LabPair(a, b) => {
                let cand_a = checker.faculty_candidates(&a.name, slot, rng);
                let cand_b = checker.faculty_candidates(&b.name, slot, rng);
                let (fac_a, fac_b) = cand_a.iter().find_map(|fa| {
                    cand_b
                        .iter()
                        .find(|fb| fb.name != fa.name)
                        .map(|fb| (*fa, *fb))
                })?;
                let (room_a, room_b) = checker.lab_room_pair(slot)?;
                Some(Session::PairedLab {
                    first: Assignment {
                        subject: a.name.clone(),
                        faculty: fac_a.name.clone(),
                        room: room_a.name.clone(),
                    },
                    second: Assignment {
                        subject: b.name.clone(),
                        faculty: fac_b.name.clone(),
                        room: room_b.name.clone(),
                    },
                })
            }
            DemandUnit::SingleLab(subject) => {
                let faculty = *checker.faculty_candidates(&subject.name, slot, rng).first()?;
                let room = checker.lab_room(slot)?;
                Some(Session::Lab(Assignment {
                    subject: subject.name.clone(),
                    faculty: faculty.name.clone(),
                    room: room.name.clone(),
                }))
            }
            DemandUnit::Theory(subject) => {
                if !checker.under_day_cap(&subject.name, slot) {
                    return None;
                }
                let faculty = *checker.faculty_candidates(&subject.name, slot, rng).first()?;
                let room = checker.theory_room(subject, slot)?;
                Some(Session::Theory(Assignment {
                    subject: subject.name.clone(),
                    faculty: faculty.name.clone(),
                    room: room.name.clone(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Day, Faculty, Room, RoomKind, Shift};
    use crate::solver::grid::build_slots;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

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
                credits: 5,
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

    #[test]
    fn units_spread_across_lightest_days() {
        let roster = roster();
        let batch = Batch {
            name: "B1".into(),
            semester: 1,
            shift: Shift::Morning,
        };
        let slots = build_slots(batch.shift);
        let prefs = BTreeMap::new();
        let assigner = SlotAssigner::new(&roster, &prefs, &batch, &slots);
        let mut index = ResourceIndex::new();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..5 {
            let outcome = assigner
                .place(&mut index, DemandUnit::Theory(&roster.subjects[0]), &mut rng)
                .unwrap();
            assert!(matches!(outcome, UnitOutcome::Placed(_)));
        }
        let days: Vec<Day> = index.entries().iter().map(|e| e.day).collect();
        assert_eq!(days, Day::ALL.to_vec());
        assert!(index.entries().iter().all(|e| e.period == slots[0].period));
    }

    #[test]
    fn unit_without_room_is_dropped() {
        let mut roster = roster();
        roster.rooms.clear();
        let batch = Batch {
            name: "B1".into(),
            semester: 1,
            shift: Shift::Evening,
        };
        let slots = build_slots(batch.shift);
        let prefs = BTreeMap::new();
        let assigner = SlotAssigner::new(&roster, &prefs, &batch, &slots);
        let mut index = ResourceIndex::new();
        let mut rng = StdRng::seed_from_u64(1);

        let outcome = assigner
            .place(&mut index, DemandUnit::Theory(&roster.subjects[0]), &mut rng)
            .unwrap();
        assert_eq!(outcome, UnitOutcome::Dropped);
        assert!(index.entries().is_empty());
    }
}
