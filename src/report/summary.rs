use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::metrics::{Elapsed, MemoryHistory, SeriesKey};

use super::Flowchart;

/// Shown wherever a figure cannot be computed for lack of samples.
pub const NO_DATA: &str = "no data";

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStats {
    pub key: SeriesKey,
    pub max: f64,
    pub avg: f64,
    pub last: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportStats {
    pub peak_rss: f64,
    pub series_count: usize,
    /// First and last timestamp of the run.
    pub duration: Option<(Elapsed, Elapsed)>,
    /// Highest total and when it happened.
    pub peak_total: Option<(Elapsed, f64)>,
    pub per_series: Vec<SeriesStats>,
}

impl ReportStats {
    pub fn from_history(history: &MemoryHistory) -> Self {
        let timeline = history.timeline();
        let duration = timeline.first().zip(timeline.last()).map(|(a, b)| (*a, *b));

        let peak_total = timeline
            .iter()
            .zip(history.aggregate())
            .fold(None, |best: Option<(Elapsed, f64)>, (at, total)| match best {
                Some((_, peak)) if peak >= total => best,
                _ => Some((*at, total)),
            });

        let per_series = history
            .series()
            .filter_map(|(key, series)| {
                Some(SeriesStats {
                    key: key.clone(),
                    max: series.max_value(),
                    avg: series.avg_value(),
                    last: series.last_value()?,
                })
            })
            .collect();

        Self {
            peak_rss: history.peak_rss(),
            series_count: history.series_count(),
            duration,
            peak_total,
            per_series,
        }
    }

    pub fn has_data(&self) -> bool {
        self.duration.is_some()
    }

    pub fn duration_text(&self) -> String {
        match self.duration {
            Some((first, last)) => format!("{} to {}", first, last),
            None => NO_DATA.to_string(),
        }
    }
}

/// Markdown report for the build summary.
///
/// Embeds the diagram source and points at the chart by file name.
pub fn compose_report(stats: &ReportStats, diagram: &Flowchart, chart_name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Build daemon memory");
    let _ = writeln!(out);

    if !stats.has_data() {
        let _ = writeln!(out, "No memory samples were recorded ({}).", NO_DATA);
        let _ = writeln!(out);
        let _ = writeln!(out, "- **Processes observed:** 0");
        let _ = writeln!(out, "- **Monitoring duration:** {}", stats.duration_text());
        return out;
    }

    let _ = writeln!(out, "- **Peak process RSS:** {:.1} MB", stats.peak_rss);
    if let Some((at, total)) = stats.peak_total {
        let _ = writeln!(out, "- **Peak total RSS:** {:.1} MB at {}", total, at);
    }
    let _ = writeln!(out, "- **Processes observed:** {}", stats.series_count);
    let _ = writeln!(out, "- **Monitoring duration:** {}", stats.duration_text());
    let _ = writeln!(out);

    let _ = writeln!(out, "| Process | Max RSS (MB) | Avg RSS (MB) | Last RSS (MB) |");
    let _ = writeln!(out, "|---|---:|---:|---:|");
    for s in &stats.per_series {
        let _ = writeln!(out, "| {} | {:.1} | {:.1} | {:.1} |", s.key, s.max, s.avg, s.last);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "### Memory timeline");
    let _ = writeln!(out);
    let _ = writeln!(out, "```mermaid");
    let _ = write!(out, "{}", diagram);
    let _ = writeln!(out, "```");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Full resolution chart: `{}` (attached to the build as an artifact).",
        chart_name
    );
    out
}

/// Appends `report` to the summary file, creating it if needed. Existing
/// content is kept.
pub fn append_to_sink(path: &Path, report: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    file.write_all(report.as_bytes())
        .and_then(|_| file.write_all(b"\n"))
        .map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str = "Starting memory monitor at now\nElapsed_Time | PID | Name | Heap_Used_MB | Heap_Capacity_MB | RSS_MB\n";

    fn sample_history() -> MemoryHistory {
        MemoryHistory::parse(&format!(
            "{HEADER}\
            00:00:00 | 101 | DaemonA | 1MB | 1MB | 100.0MB\n\
            00:00:00 | 202 | DaemonB | 1MB | 1MB | 50.0MB\n\
            00:00:05 | 101 | DaemonA | 1MB | 1MB | 150.0MB\n\
            00:00:05 | 202 | DaemonB | 1MB | 1MB | 50.0MB\n\
            00:00:10 | 101 | DaemonA | 1MB | 1MB | 200.0MB\n"
        ))
    }

    #[test]
    fn statistics() {
        let stats = ReportStats::from_history(&sample_history());
        assert_eq!(stats.peak_rss, 200.0);
        assert_eq!(stats.series_count, 2);
        assert_eq!(stats.duration_text(), "00:00:00 to 00:00:10");
        // 200 at 00:00:05 is reached first and not beaten at 00:00:10.
        assert_eq!(stats.peak_total, Some((Elapsed::from_secs(5), 200.0)));
        assert_eq!(
            stats.per_series[0],
            SeriesStats {
                key: SeriesKey::new(101, "DaemonA"),
                max: 200.0,
                avg: 150.0,
                last: 200.0,
            }
        );
        assert_eq!(stats.per_series[1].last, 50.0);
    }

    #[test]
    fn no_data_report() {
        let history = MemoryHistory::parse(HEADER);
        let stats = ReportStats::from_history(&history);
        assert!(!stats.has_data());
        assert_eq!(stats.duration_text(), NO_DATA);

        let report = compose_report(&stats, &Flowchart::from_history(&history), "memory-chart.svg");
        assert!(report.contains("no data"));
        assert!(!report.contains("```mermaid"));
    }

    #[test]
    fn report_embeds_diagram_and_table() {
        let history = sample_history();
        let diagram = Flowchart::from_history(&history);
        let report = compose_report(&ReportStats::from_history(&history), &diagram, "memory-chart.svg");

        assert!(report.contains(&format!("```mermaid\n{}```\n", diagram)));
        assert!(report.contains("| 101-DaemonA | 200.0 | 150.0 | 200.0 |"));
        assert!(report.contains("| 202-DaemonB | 50.0 | 50.0 | 50.0 |"));
        assert!(report.contains("- **Peak total RSS:** 200.0 MB at 00:00:05"));
        assert!(report.contains("`memory-chart.svg`"));
    }

    #[test]
    fn sink_is_appended_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dir.path().join("summary.md");
        std::fs::write(&sink, "# Build\n\nearlier step output\n").unwrap();

        append_to_sink(&sink, "## Build daemon memory\n").unwrap();
        append_to_sink(&sink, "second").unwrap();

        assert_eq!(
            std::fs::read_to_string(&sink).unwrap(),
            "# Build\n\nearlier step output\n## Build daemon memory\n\nsecond\n"
        );
    }
}
