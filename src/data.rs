use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

// Type aliases for clarity
pub type EntryId = u64;
pub type Semester = u8;

/// A teaching day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Day {
    pub const ALL: [Day; 5] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Wall-clock time of day, stored as minutes from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    pub const fn hm(hour: u16, minute: u16) -> Self {
        ClockTime(hour * 60 + minute)
    }

    fn parse(raw: &str) -> Option<Self> {
        let (h, m) = raw.trim().split_once(':')?;
        let h: u16 = h.trim().parse().ok()?;
        let m: u16 = m.trim().parse().ok()?;
        (h < 24 && m < 60).then(|| ClockTime::hm(h, m))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ClockTime::parse(&value).ok_or_else(|| format!("invalid clock time '{value}'"))
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

/// One fixed instructional block within a day, e.g. `08:10-09:05`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl Period {
    pub const fn new(start: ClockTime, end: ClockTime) -> Self {
        Period { start, end }
    }

    /// Parses a period token, tolerating stray whitespace and typographic dashes.
    pub fn parse(token: &str) -> Option<Self> {
        let canonical: String = token
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
                other => other,
            })
            .collect();
        let (start, end) = canonical.split_once('-')?;
        let period = Period::new(ClockTime::parse(start)?, ClockTime::parse(end)?);
        (period.start < period.end).then_some(period)
    }

    pub fn within(&self, start: ClockTime, end: ClockTime) -> bool {
        start <= self.start && self.end <= end
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Period::parse(&value).ok_or_else(|| format!("invalid period token '{value}'"))
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.to_string()
    }
}

const fn period(h1: u16, m1: u16, h2: u16, m2: u16) -> Period {
    Period::new(ClockTime::hm(h1, m1), ClockTime::hm(h2, m2))
}

pub const MORNING_PERIODS: [Period; 5] = [
    period(8, 10, 9, 5),
    period(9, 5, 10, 0),
    period(10, 20, 11, 15),
    period(11, 15, 12, 10),
    period(12, 10, 13, 5),
];

pub const EVENING_PERIODS: [Period; 5] = [
    period(13, 15, 14, 10),
    period(14, 10, 15, 5),
    period(15, 5, 16, 0),
    period(16, 20, 17, 15),
    period(17, 15, 18, 10),
];

/// The daily period template a batch follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shift {
    Morning,
    Evening,
}

impl Shift {
    pub fn periods(self) -> &'static [Period] {
        match self {
            Shift::Morning => &MORNING_PERIODS,
            Shift::Evening => &EVENING_PERIODS,
        }
    }

    /// Position of `period` within this template, if it belongs to it.
    pub fn position(self, period: Period) -> Option<usize> {
        self.periods().iter().position(|p| *p == period)
    }
}

/// A student cohort with its own weekly grid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Batch {
    pub name: String,
    pub semester: Semester,
    pub shift: Shift,
}

/// A window during which a faculty member can teach on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AvailabilityWindow {
    pub day: Day,
    pub start: ClockTime,
    pub end: ClockTime,
}

fn default_max_hours_per_day() -> u32 {
    4
}

fn default_max_hours_per_week() -> u32 {
    20
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub batch_assignments: Vec<String>,
    #[serde(default)]
    pub availability: Vec<AvailabilityWindow>,
    #[serde(default = "default_max_hours_per_day")]
    pub max_hours_per_day: u32,
    #[serde(default = "default_max_hours_per_week")]
    pub max_hours_per_week: u32,
}

impl Faculty {
    pub fn teaches(&self, subject: &str) -> bool {
        self.subjects.iter().any(|s| s.eq_ignore_ascii_case(subject))
    }

    pub fn serves(&self, batch: &str) -> bool {
        self.batch_assignments.iter().any(|b| b == batch)
    }

    /// A faculty without availability records is always available. Otherwise the
    /// period must sit entirely inside one of that day's windows.
    pub fn is_available(&self, day: Day, period: Period) -> bool {
        self.availability.is_empty()
            || self
                .availability
                .iter()
                .any(|w| w.day == day && period.within(w.start, w.end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Theory,
    Lab,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Room {
    pub name: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(rename = "type")]
    pub kind: RoomKind,
}

fn default_students() -> u32 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub name: String,
    pub semester: Semester,
    pub credits: u32,
    #[serde(default)]
    pub is_lab: bool,
    #[serde(default = "default_students")]
    pub students: u32,
    #[serde(rename = "batchAssignment")]
    pub batch: String,
}

impl Subject {
    /// Weekly slots this subject asks for.
    pub fn demand_units(&self) -> u32 {
        self.credits.max(1)
    }

    pub fn room_kind(&self) -> RoomKind {
        if self.is_lab { RoomKind::Lab } else { RoomKind::Theory }
    }
}

/// Immutable copy of the roster taken at the start of a run.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Roster {
    pub faculty: Vec<Faculty>,
    pub subjects: Vec<Subject>,
    pub rooms: Vec<Room>,
}

impl Roster {
    pub fn faculty(&self, name: &str) -> Option<&Faculty> {
        self.faculty.iter().find(|f| f.name == name)
    }

    pub fn subject(&self, batch: &str, name: &str) -> Option<&Subject> {
        self.subjects
            .iter()
            .find(|s| s.batch == batch && s.name == name)
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.name == name)
    }
}

/// Who teaches what, and where, within one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Assignment {
    pub subject: String,
    pub faculty: String,
    pub room: String,
}

/// The content of one grid cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Session {
    Theory(Assignment),
    Lab(Assignment),
    /// Two lab subjects sharing one slot, each with its own room and faculty.
    PairedLab { first: Assignment, second: Assignment },
}

impl Session {
    pub fn assignments(&self) -> Vec<&Assignment> {
        match self {
            Session::Theory(a) | Session::Lab(a) => vec![a],
            Session::PairedLab { first, second } => vec![first, second],
        }
    }

    pub fn is_lab(&self) -> bool {
        !matches!(self, Session::Theory(_))
    }

    pub fn faculty_tokens(&self) -> impl Iterator<Item = &str> {
        self.assignments().into_iter().map(|a| a.faculty.as_str())
    }

    pub fn room_tokens(&self) -> impl Iterator<Item = &str> {
        self.assignments().into_iter().map(|a| a.room.as_str())
    }

    pub fn covers_subject(&self, subject: &str) -> bool {
        self.assignments().iter().any(|a| a.subject == subject)
    }

    pub fn uses_room(&self, room: &str) -> bool {
        self.room_tokens().any(|r| r == room)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Theory(a) | Session::Lab(a) => {
                write!(f, "{} ({}, {})", a.subject, a.faculty, a.room)
            }
            Session::PairedLab { first, second } => write!(
                f,
                "{} / {} ({} / {}, {} / {})",
                first.subject,
                second.subject,
                first.faculty,
                second.faculty,
                first.room,
                second.room
            ),
        }
    }
}

/// Represents a single committed cell of a batch's weekly grid.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub id: EntryId,
    pub day: Day,
    pub period: Period,
    pub batch: String,
    pub session: Session,
    pub created_at: SystemTime,
}

/// A run-level omission caused by missing input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InsufficientInput {
    NoSubjects { batch: String },
    #[serde(rename_all = "camelCase")]
    NoQualifiedFaculty {
        batch: String,
        subject: String,
        credits: u32,
    },
    /// The subject names a batch that is not configured for the run.
    UnknownBatch {
        batch: String,
        subject: String,
        credits: u32,
    },
    /// A batch listed more than once; only its first listing is scheduled.
    DuplicateBatch { batch: String },
}

impl fmt::Display for InsufficientInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsufficientInput::NoSubjects { batch } => {
                write!(f, "[No Subjects] batch {batch} has no subjects")
            }
            InsufficientInput::NoQualifiedFaculty {
                batch,
                subject,
                credits,
            } => write!(
                f,
                "[No Faculty] no faculty can teach {subject} for {batch} \
                 ({credits} credits skipped)"
            ),
            InsufficientInput::UnknownBatch {
                batch,
                subject,
                credits,
            } => write!(
                f,
                "[Unknown Batch] {subject} belongs to unconfigured batch {batch} \
                 ({credits} credits skipped)"
            ),
            InsufficientInput::DuplicateBatch { batch } => {
                write!(f, "[Duplicate Batch] {batch} is configured more than once")
            }
        }
    }
}

/// Demand that could not be fully placed for one (batch, subject).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortfall {
    pub batch: String,
    pub subject: String,
    pub requested: u32,
    pub placed: u32,
}

impl Shortfall {
    pub fn missing(&self) -> u32 {
        self.requested.saturating_sub(self.placed)
    }
}

impl fmt::Display for Shortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Shortfall] {} / {}: placed {} of {}",
            self.batch, self.subject, self.placed, self.requested
        )
    }
}

/// What a successful run reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub entries_committed: usize,
    pub dropped_units: u32,
    pub shortfalls: Vec<Shortfall>,
    pub skipped: Vec<InsufficientInput>,
}

/// The final output of the engine.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub entries: Vec<TimetableEntry>,
    pub summary: RunSummary,
}
