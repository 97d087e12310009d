use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::data::{Batch, Semester, Shift};
use crate::error::StoreError;

/// Runtime settings. Read from the JSON file named by `TIMETABLE_CONFIG`,
/// then overridden field by field from the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub bind_addr: String,
    pub log_filter: String,
    /// Fixed seed for reproducible runs; fresh entropy per run when unset.
    pub seed: Option<u64>,
    /// JSON file for the generated grid; kept in memory when unset.
    pub store_path: Option<PathBuf>,
    /// Roster document loaded at startup.
    pub roster_path: Option<PathBuf>,
    /// Batches in processing order.
    pub batches: Vec<Batch>,
    /// Preferred theory room per semester.
    pub semester_rooms: BTreeMap<Semester, String>,
}

impl Default for Config {
    fn default() -> Self {
        let batches = [1, 3, 5]
            .into_iter()
            .flat_map(|sem| {
                [(Shift::Morning, 'M'), (Shift::Evening, 'E')].map(|(shift, tag)| Batch {
                    name: format!("BCA {sem} ({tag})"),
                    semester: sem,
                    shift,
                })
            })
            .collect();

        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            log_filter: "info".to_string(),
            seed: None,
            store_path: None,
            roster_path: None,
            batches,
            semester_rooms: BTreeMap::from([
                (1, "F1".to_string()),
                (3, "F2".to_string()),
                (5, "F3".to_string()),
            ]),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, StoreError> {
        let mut config = match std::env::var_os("TIMETABLE_CONFIG") {
            Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            None => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("TIMETABLE_BIND") {
            self.bind_addr = addr;
        }
        if let Some(seed) = var("TIMETABLE_SEED").and_then(|s| s.parse().ok()) {
            self.seed = Some(seed);
        }
        if let Some(path) = var("TIMETABLE_STORE") {
            self.store_path = Some(path.into());
        }
        if let Some(path) = var("TIMETABLE_ROSTER") {
            self.roster_path = Some(path.into());
        }
        if let Some(filter) = var("TIMETABLE_LOG") {
            self.log_filter = filter;
        }
    }
}
