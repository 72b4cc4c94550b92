use std::collections::{BTreeSet, HashMap};

use log::debug;

use super::{Elapsed, Sample, SeriesKey};

/// Number of lines at the top of a log that never hold samples.
const HEADER_LINES: usize = 2;

/// RSS history of one process instance, in log order.
#[derive(Debug, Clone, Default)]
pub struct Series {
    timestamps: Vec<Elapsed>,
    rss: Vec<f64>,
    /// Position of each timestamp in `timestamps`, for constant time lookup.
    index: HashMap<Elapsed, usize>,
}

impl Series {
    fn push(&mut self, elapsed: Elapsed, rss_mb: f64) {
        // A duplicate timestamp keeps the first reading for lookups.
        self.index.entry(elapsed).or_insert(self.timestamps.len());
        self.timestamps.push(elapsed);
        self.rss.push(rss_mb);
    }

    pub fn timestamps(&self) -> &[Elapsed] {
        &self.timestamps
    }

    pub fn rss(&self) -> &[f64] {
        &self.rss
    }

    pub fn len(&self) -> usize {
        self.rss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rss.is_empty()
    }

    /// RSS at exactly `at`, if this process was sampled then.
    pub fn value_at(&self, at: &Elapsed) -> Option<f64> {
        self.index.get(at).map(|&i| self.rss[i])
    }

    pub fn max_value(&self) -> f64 {
        self.rss.iter().copied().fold(0.0, f64::max)
    }

    pub fn avg_value(&self) -> f64 {
        if self.rss.is_empty() {
            return 0.0;
        }
        self.rss.iter().sum::<f64>() / self.rss.len() as f64
    }

    pub fn last_value(&self) -> Option<f64> {
        self.rss.last().copied()
    }
}

/// Every series found in a monitor log plus their merged timeline.
///
/// Built once per rendering pass and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    /// Series in order of first appearance in the log.
    series: Vec<(SeriesKey, Series)>,
    timeline: Vec<Elapsed>,
}

impl MemoryHistory {
    /// Parses the full text of a monitor log.
    ///
    /// The first two lines are headers and are skipped unconditionally.
    /// Malformed lines are dropped; this never fails.
    pub fn parse(log: &str) -> Self {
        let mut positions: HashMap<SeriesKey, usize> = HashMap::new();
        let mut series: Vec<(SeriesKey, Series)> = Vec::new();
        let mut timeline = BTreeSet::new();
        let mut dropped = 0usize;

        for line in log.lines().skip(HEADER_LINES) {
            if line.trim().is_empty() {
                continue;
            }
            let Some(sample) = Sample::parse_line(line) else {
                dropped += 1;
                continue;
            };

            let key = sample.key();
            let pos = *positions.entry(key.clone()).or_insert_with(|| {
                series.push((key, Series::default()));
                series.len() - 1
            });
            series[pos].1.push(sample.elapsed, sample.rss_mb);
            timeline.insert(sample.elapsed);
        }

        if dropped > 0 {
            debug!("dropped {} malformed log lines", dropped);
        }

        Self {
            series,
            timeline: timeline.into_iter().collect(),
        }
    }

    pub fn series(&self) -> impl Iterator<Item = (&SeriesKey, &Series)> {
        self.series.iter().map(|(key, series)| (key, series))
    }

    pub fn get(&self, key: &SeriesKey) -> Option<&Series> {
        self.series
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, series)| series)
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Sorted, deduplicated union of all timestamps.
    pub fn timeline(&self) -> &[Elapsed] {
        &self.timeline
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Sum of RSS over every series sampled at exactly `at`.
    pub fn aggregate_at(&self, at: &Elapsed) -> f64 {
        self.series
            .iter()
            .filter_map(|(_, series)| series.value_at(at))
            .sum()
    }

    /// Aggregate RSS for each timeline entry.
    pub fn aggregate(&self) -> Vec<f64> {
        self.timeline.iter().map(|at| self.aggregate_at(at)).collect()
    }

    /// Largest single-process reading.
    pub fn peak_rss(&self) -> f64 {
        self.series
            .iter()
            .map(|(_, series)| series.max_value())
            .fold(0.0, f64::max)
    }
}
