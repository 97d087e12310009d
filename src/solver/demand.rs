use crate::data::Subject;

/// Outstanding weekly units for one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandItem {
    pub subject: String,
    pub remaining: u32,
}

/// A batch's demand, split into lab and theory pools in roster order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demand {
    pub lab: Vec<DemandItem>,
    pub theory: Vec<DemandItem>,
}

impl Demand {
    pub fn total_units(&self) -> u32 {
        self.lab.iter().chain(&self.theory).map(|d| d.remaining).sum()
    }
}

pub fn plan_demand<'a>(subjects: impl IntoIterator<Item = &'a Subject>) -> Demand {
    let mut demand = Demand::default();
    for subject in subjects {
        let item = DemandItem {
            subject: subject.name.clone(),
            remaining: subject.demand_units(),
        };
        if subject.is_lab {
            demand.lab.push(item);
        } else {
            demand.theory.push(item);
        }
    }
    demand
}
