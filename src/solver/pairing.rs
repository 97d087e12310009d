use itertools::Itertools;
use std::cmp::Reverse;

use super::demand::DemandItem;

/// Two lab subjects that share one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabPair {
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabPlan {
    pub pairs: Vec<LabPair>,
    /// Unpaired lab units, one element per unit.
    pub singles: Vec<String>,
}

/// Greedily pairs the two labs with the most remaining units until fewer than
/// two labs still need time. Ties keep roster order.
pub fn plan_lab_pairs(labs: &[DemandItem]) -> LabPlan {
    let mut left: Vec<(String, u32)> = labs
        .iter()
        .map(|d| (d.subject.clone(), d.remaining))
        .collect();
    let mut plan = LabPlan::default();

    loop {
        let open = left
            .iter()
            .enumerate()
            .filter(|(_, (_, units))| *units > 0)
            .sorted_by_key(|(_, (_, units))| Reverse(*units))
            .map(|(i, _)| i)
            .take(2)
            .collect_vec();
        let &[a, b] = open.as_slice() else {
            break;
        };

        plan.pairs.push(LabPair {
            first: left[a].0.clone(),
            second: left[b].0.clone(),
        });
        left[a].1 -= 1;
        left[b].1 -= 1;
    }

    for (subject, units) in left {
        plan.singles.extend(std::iter::repeat_n(subject, units as usize));
    }
    plan
}
