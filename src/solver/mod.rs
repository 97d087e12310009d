//! Timetable generation engine.
//!
//! One run walks the batches in order. For each batch it plans demand, pairs
//! lab units, and places pairs, leftover labs and theory units first-fit into
//! the batch's grid. A single [`ResourceIndex`] carries faculty and room
//! occupancy across all batches of the run.

pub mod assigner;
pub mod checker;
pub mod demand;
pub mod grid;
pub mod index;
pub mod pairing;


use itertools::Itertools;
use log::{debug, info, trace, warn};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use crate::data::{
    Batch, GenerationOutput, InsufficientInput, Roster, RunSummary, Semester, Shortfall, Subject,
};
use crate::error::EngineError;
use assigner::{DemandUnit, SlotAssigner, UnitOutcome, resolve_pair};
use checker::has_qualified_faculty;
use demand::plan_demand;
use index::ResourceIndex;
use pairing::plan_lab_pairs;

/// Runs the greedy engine over every batch against an immutable roster.
pub fn generate<R: Rng + ?Sized>(
    roster: &Roster,
    batches: &[Batch],
    semester_rooms: &BTreeMap<Semester, String>,
    rng: &mut R,
) -> Result<GenerationOutput, EngineError> {
    let start_time = Instant::now();
    info!(
        "Generating timetable for {} batches with {} faculty, {} subjects and {} rooms...",
        batches.len(),
        roster.faculty.len(),
        roster.subjects.len(),
        roster.rooms.len()
    );

    let mut index = ResourceIndex::new();
    let mut summary = RunSummary::default();
    let subjects_by_batch = roster
        .subjects
        .iter()
        .map(|s| (s.batch.as_str(), s))
        .into_group_map();

    let mut seen: HashSet<&str> = HashSet::new();
    for batch in batches {
        if !seen.insert(batch.name.as_str()) {
            warn!("Batch {} is configured more than once; scheduling it once", batch.name);
            summary.skipped.push(InsufficientInput::DuplicateBatch {
                batch: batch.name.clone(),
            });
            continue;
        }
        let Some(subjects) = subjects_by_batch.get(batch.name.as_str()) else {
            warn!("No subjects for {}", batch.name);
            summary.skipped.push(InsufficientInput::NoSubjects {
                batch: batch.name.clone(),
            });
            continue;
        };
        schedule_batch(roster, batch, subjects, semester_rooms, &mut index, &mut summary, rng)?;
    }

    let orphans = subjects_by_batch
        .iter()
        .filter(|(name, _)| !seen.contains(*name))
        .sorted_by_key(|(name, _)| **name);
    for (name, subjects) in orphans {
        for subject in subjects {
            warn!("{} is assigned to {name}, which is not a configured batch", subject.name);
            summary.skipped.push(InsufficientInput::UnknownBatch {
                batch: name.to_string(),
                subject: subject.name.clone(),
                credits: subject.demand_units(),
            });
            summary.shortfalls.push(Shortfall {
                batch: name.to_string(),
                subject: subject.name.clone(),
                requested: subject.demand_units(),
                placed: 0,
            });
        }
    }

    let entries = index.into_entries();
    summary.entries_committed = entries.len();
    summary.dropped_units = summary.shortfalls.iter().map(Shortfall::missing).sum();
    info!(
        "Generated {} entries in {:.2?} ({} units dropped)",
        entries.len(),
        start_time.elapsed(),
        summary.dropped_units
    );

    Ok(GenerationOutput { entries, summary })
}

fn schedule_batch<R: Rng + ?Sized>(
    roster: &Roster,
    batch: &Batch,
    subjects: &[&Subject],
    semester_rooms: &BTreeMap<Semester, String>,
    index: &mut ResourceIndex,
    summary: &mut RunSummary,
    rng: &mut R,
) -> Result<(), EngineError> {
    let (staffed, unstaffed): (Vec<&Subject>, Vec<&Subject>) = subjects
        .iter()
        .copied()
        .partition(|s| has_qualified_faculty(roster, &s.name, &batch.name));

    for subject in unstaffed {
        warn!("No faculty can teach {} for {}; skipping", subject.name, batch.name);
        summary.skipped.push(InsufficientInput::NoQualifiedFaculty {
            batch: batch.name.clone(),
            subject: subject.name.clone(),
            credits: subject.demand_units(),
        });
        summary.shortfalls.push(Shortfall {
            batch: batch.name.clone(),
            subject: subject.name.clone(),
            requested: subject.demand_units(),
            placed: 0,
        });
    }

    let demand = plan_demand(staffed.iter().copied());
    let lab_plan = plan_lab_pairs(&demand.lab);
    debug!(
        "{}: {} demand units, {} lab pairs, {} single labs",
        batch.name,
        demand.total_units(),
        lab_plan.pairs.len(),
        lab_plan.singles.len()
    );

    let mut units: Vec<DemandUnit<'_>> = lab_plan
        .pairs
        .iter()
        .filter_map(|pair| resolve_pair(roster, &batch.name, pair))
        .collect();
    units.extend(
        lab_plan
            .singles
            .iter()
            .filter_map(|name| roster.subject(&batch.name, name))
            .map(DemandUnit::SingleLab),
    );

    let mut theory_pool: Vec<DemandUnit<'_>> = demand
        .theory
        .iter()
        .filter_map(|d| roster.subject(&batch.name, &d.subject).map(|s| (s, d.remaining)))
        .flat_map(|(s, n)| std::iter::repeat_n(DemandUnit::Theory(s), n as usize))
        .collect();
    theory_pool.shuffle(rng);
    units.extend(theory_pool);

    let slots = grid::build_slots(batch.shift);
    let assigner = SlotAssigner::new(roster, semester_rooms, batch, &slots);
    for unit in units {
        match assigner.place(index, unit, rng)? {
            UnitOutcome::Placed(id) => {
                trace!("Placed {} for {} as entry {id}", unit.describe(), batch.name)
            }
            UnitOutcome::Dropped => {
                warn!("Could not place {} for {}", unit.describe(), batch.name)
            }
        }
    }
    debug!("{}: {} entries committed so far this run", batch.name, index.entries().len());

    for subject in staffed {
        let placed = index.placed_units(&batch.name, &subject.name);
        if placed < subject.demand_units() {
            summary.shortfalls.push(Shortfall {
                batch: batch.name.clone(),
                subject: subject.name.clone(),
                requested: subject.demand_units(),
                placed,
            });
        }
    }
    Ok(())
}
