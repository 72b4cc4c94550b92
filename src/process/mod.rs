mod monitor;
pub mod sampler;
pub mod supervisor;

pub use monitor::*;
pub use sampler::*;
pub use supervisor::*;

use std::collections::HashMap;

use crate::error::Result;
use crate::metrics::round1;

/// A live process as seen by the inspector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

impl ProcessInfo {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

/// Named garbage collector counters of a JVM, in kilobytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcCounters(HashMap<String, f64>);

impl GcCounters {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Zips a `jstat -gc` header row with its value row.
    ///
    /// Returns `None` when the rows disagree in length. Columns the JVM
    /// reports as `-` (collector not in use) are left out.
    pub fn from_jstat(header: &str, values: &str) -> Option<Self> {
        let names: Vec<&str> = header.split_whitespace().collect();
        let values: Vec<&str> = values.split_whitespace().collect();
        if names.is_empty() || names.len() != values.len() {
            return None;
        }
        Some(
            names
                .into_iter()
                .zip(values)
                .filter_map(|(name, value)| Some((name, value.parse::<f64>().ok()?)))
                .collect(),
        )
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for GcCounters {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Heap figures derived from [`GcCounters`], in megabytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeapUsage {
    pub used_mb: f64,
    pub capacity_mb: f64,
}

impl HeapUsage {
    /// Eden plus old generation, used and capacity. `None` if any of the
    /// four counters is missing.
    pub fn from_counters(counters: &GcCounters) -> Option<Self> {
        let used = counters.get("EU")? + counters.get("OU")?;
        let capacity = counters.get("EC")? + counters.get("OC")?;
        Some(Self {
            used_mb: round1(used / 1024.0),
            capacity_mb: round1(capacity / 1024.0),
        })
    }
}

/// Source of process listings and memory readings.
///
/// Reads may fail at any time: the process can exit between listing and
/// inspection.
pub trait ProcessInspector {
    fn list_processes(&mut self) -> Result<Vec<ProcessInfo>>;

    fn gc_counters(&mut self, pid: u32) -> Result<GcCounters>;

    /// Resident set size in kilobytes.
    fn resident_kb(&mut self, pid: u32) -> Result<u64>;
}
