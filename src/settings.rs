use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;

use crate::error::{Error, Result};

/// JVM daemons a build may leave running. Matched against the simple main
/// class name of each live process.
pub const DEFAULT_WATCHED_PROCESSES: [&str; 3] =
    ["GradleDaemon", "KotlinCompileDaemon", "GradleWorkerMain"];

/// Upper bound on the watch list.
pub const MAX_WATCHED_PROCESSES: usize = 3;

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)] // missing keys in a config file fall back to the defaults below
pub struct Settings {
    pub interval_secs: u64,
    pub log_file: PathBuf,
    pub pid_file: PathBuf,
    pub output_dir: PathBuf,
    pub chart_file: String,
    pub diagram_file: String,
    pub watched_processes: Vec<String>,
    pub startup_grace_secs: u64,
    pub stop_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            log_file: PathBuf::from("memory-monitor.log"),
            pid_file: PathBuf::from("memory-monitor.pid"),
            output_dir: PathBuf::from("."),
            chart_file: "memory-chart.svg".to_string(),
            diagram_file: "memory-diagram.mmd".to_string(),
            watched_processes: DEFAULT_WATCHED_PROCESSES
                .iter()
                .map(|name| name.to_string())
                .collect(),
            startup_grace_secs: 10,
            stop_timeout_secs: 5,
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let settings: Settings = serde_json::from_str(&text)?;
        Ok(settings.normalized())
    }

    /// Clamps values that would make the sampler misbehave.
    pub fn normalized(mut self) -> Self {
        if self.interval_secs == 0 {
            warn!("interval of 0s requested, using 1s");
            self.interval_secs = 1;
        }
        if self.watched_processes.len() > MAX_WATCHED_PROCESSES {
            warn!(
                "only {} watched processes are supported, ignoring {:?}",
                MAX_WATCHED_PROCESSES,
                &self.watched_processes[MAX_WATCHED_PROCESSES..]
            );
            self.watched_processes.truncate(MAX_WATCHED_PROCESSES);
        }
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn chart_path(&self) -> PathBuf {
        self.output_dir.join(&self.chart_file)
    }

    pub fn diagram_path(&self) -> PathBuf {
        self.output_dir.join(&self.diagram_file)
    }

    /// Where the detached sampler's stdout/stderr goes until it is up.
    pub fn startup_log(&self) -> PathBuf {
        let mut name = self.log_file.clone().into_os_string();
        name.push(".startup");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "interval_secs": 2, "output_dir": "reports" }}"#).unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.interval_secs, 2);
        assert_eq!(settings.chart_path(), PathBuf::from("reports/memory-chart.svg"));
        assert_eq!(settings.watched_processes.len(), 3);
        assert_eq!(settings.pid_file, PathBuf::from("memory-monitor.pid"));
    }

    #[test]
    fn watch_list_is_capped() {
        let settings = Settings {
            watched_processes: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            interval_secs: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(settings.watched_processes, vec!["A", "B", "C"]);
        assert_eq!(settings.interval(), Duration::from_secs(1));
    }

    #[test]
    fn malformed_config_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            Settings::load(Some(file.path())),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn startup_log_sits_next_to_log_file() {
        let settings = Settings {
            log_file: PathBuf::from("out/monitor.log"),
            ..Default::default()
        };
        assert_eq!(settings.startup_log(), PathBuf::from("out/monitor.log.startup"));
    }
}
