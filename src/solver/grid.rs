use crate::data::{Day, Period, Shift};

/// A (day, period) cell of a batch's weekly template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub day: Day,
    pub period: Period,
    pub day_index: usize,
    pub period_index: usize,
}

/// Enumerates every slot of the week for a template, day-major.
pub fn build_slots(shift: Shift) -> Vec<Slot> {
    let periods = shift.periods();
    Day::ALL
        .iter()
        .flat_map(|&day| {
            periods.iter().enumerate().map(move |(period_index, &period)| Slot {
                day,
                period,
                day_index: day.index(),
                period_index,
            })
        })
        .collect()
}
