pub mod downsample;
pub mod history;

pub use downsample::*;
pub use history::*;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Column header written as the second line of every monitor log.
pub const LOG_COLUMNS: &str =
    "Elapsed_Time | PID | Name | Heap_Used_MB | Heap_Capacity_MB | RSS_MB";

const FIELD_SEPARATOR: char = '|';
const FIELD_COUNT: usize = 6;
const MB_SUFFIX: &str = "MB";

/// Time since the sampler started, at one second resolution.
///
/// Rendered as zero-padded `HH:MM:SS`. The hours field is not wrapped at 24.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Elapsed(u64);

impl Elapsed {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

impl From<Duration> for Elapsed {
    fn from(duration: Duration) -> Self {
        Self(duration.as_secs())
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;
        write!(f, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseElapsedError;

impl fmt::Display for ParseElapsedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected HH:MM:SS")
    }
}

impl std::error::Error for ParseElapsedError {}

impl FromStr for Elapsed {
    type Err = ParseElapsedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(h), Some(m), Some(sec), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseElapsedError);
        };

        let digits = |part: &str, width: Option<usize>| -> Result<u64, ParseElapsedError> {
            let width_ok = width.map_or(part.len() >= 2, |w| part.len() == w);
            if !width_ok || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseElapsedError);
            }
            part.parse().map_err(|_| ParseElapsedError)
        };

        let hours = digits(h, None)?;
        let minutes = digits(m, Some(2))?;
        let seconds = digits(sec, Some(2))?;
        if minutes >= 60 || seconds >= 60 {
            return Err(ParseElapsedError);
        }
        hours
            .checked_mul(3600)
            .and_then(|h| h.checked_add(minutes * 60 + seconds))
            .map(Self)
            .ok_or(ParseElapsedError)
    }
}

/// Identity of one monitored process instance.
///
/// Pids are recycled by the OS, so the name is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub pid: u32,
    pub name: String,
}

impl SeriesKey {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

/// `pid-name`, used for labels only.
impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.pid, self.name)
    }
}

/// One row of the monitor log.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub elapsed: Elapsed,
    pub pid: u32,
    pub name: String,
    pub heap_used_mb: f64,
    pub heap_capacity_mb: f64,
    pub rss_mb: f64,
}

impl Sample {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.pid, self.name.clone())
    }

    pub fn to_log_line(&self) -> String {
        format!(
            "{} | {} | {} | {:.1}MB | {:.1}MB | {:.1}MB",
            self.elapsed, self.pid, self.name, self.heap_used_mb, self.heap_capacity_mb, self.rss_mb
        )
    }

    /// Parses one data line. Returns `None` for anything malformed.
    pub fn parse_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
        if fields.len() != FIELD_COUNT {
            return None;
        }

        let name = fields[2];
        if name.is_empty() {
            return None;
        }

        Some(Self {
            elapsed: fields[0].parse().ok()?,
            pid: fields[1].parse().ok()?,
            name: name.to_string(),
            heap_used_mb: parse_megabytes(fields[3])?,
            heap_capacity_mb: parse_megabytes(fields[4])?,
            rss_mb: parse_megabytes(fields[5])?,
        })
    }
}

fn parse_megabytes(field: &str) -> Option<f64> {
    let field = field.trim();
    let number = field.strip_suffix(MB_SUFFIX).unwrap_or(field).trim();
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Rounds to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
