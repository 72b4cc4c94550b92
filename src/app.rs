use std::env;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::metrics::MemoryHistory;
use crate::process::{wait_for_pid_file, write_pid_file, Sampler, SamplerHandle, SystemInspector};
use crate::report::{append_to_sink, compose_report, render_svg, Flowchart, ReportStats};
use crate::settings::Settings;

/// Log header timestamp, e.g. `Mon Jan  1 12:00:00 +00:00 2024`.
const HEADER_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %:z %Y";

/// The monitor's three actions, driven by resolved settings.
#[derive(Debug, Clone)]
pub struct MonitorApp {
    settings: Settings,
    /// Forwarded to the detached sampler so it sees the same watch list.
    config: Option<PathBuf>,
}

impl MonitorApp {
    pub fn new(settings: Settings, config: Option<PathBuf>) -> Self {
        Self {
            settings: settings.normalized(),
            config,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn sampler_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(config) = &self.config {
            args.push("--config".into());
            args.push(config.clone().into_os_string());
        }
        args.push("sample".into());
        args.push("--interval".into());
        args.push(self.settings.interval_secs.to_string().into());
        args.push("--log-file".into());
        args.push(self.settings.log_file.clone().into_os_string());
        args.push("--pid-file".into());
        args.push(self.settings.pid_file.clone().into_os_string());
        args
    }

    /// Launches `program sample …` in the background and waits for it to
    /// write its pid file. Returns the sampler's pid.
    pub fn start(&self, program: &Path) -> Result<u32> {
        self.launch(program, &self.sampler_args())
    }

    /// A sampler that misses the startup grace is stopped before the error
    /// is returned.
    fn launch<S: AsRef<OsStr>>(&self, program: &Path, args: &[S]) -> Result<u32> {
        let pid_file = &self.settings.pid_file;
        if pid_file.exists() {
            warn!("removing stale pid file {}", pid_file.display());
            remove_if_present(pid_file)?;
        }

        let startup_log = self.settings.startup_log();
        let mut handle = SamplerHandle::spawn(program, args, &startup_log)?;

        match wait_for_pid_file(pid_file, self.settings.startup_grace()) {
            Ok(pid) => {
                info!(
                    "memory monitor started with pid {} (interval {}s, log {})",
                    pid,
                    self.settings.interval_secs,
                    self.settings.log_file.display()
                );
                Ok(pid)
            }
            Err(e) => {
                error!("memory monitor failed to start: {}", e);
                if handle.is_alive() {
                    warn!("stopping sampler {} that never wrote its pid file", handle.pid());
                    match handle.request_stop() {
                        Ok(()) if handle.wait_for_exit(self.settings.stop_timeout()) => {}
                        Ok(()) => warn!("sampler {} did not exit", handle.pid()),
                        Err(stop) => warn!("{}", stop),
                    }
                } else {
                    error!("sampler process {} already exited", handle.pid());
                }
                match fs::read_to_string(&startup_log) {
                    Ok(text) if !text.trim().is_empty() => {
                        error!("startup output:\n{}", text.trim_end())
                    }
                    _ => error!("no startup output in {}", startup_log.display()),
                }
                Err(e)
            }
        }
    }

    /// Runs the sampler in the foreground until SIGINT or SIGTERM.
    pub fn sample(&self) -> Result<()> {
        let pid_file = &self.settings.pid_file;
        write_pid_file(pid_file)?;
        info!("pid {} written to {}", std::process::id(), pid_file.display());

        let result = self.run_sampler();
        remove_if_present(pid_file)?;
        result
    }

    fn run_sampler(&self) -> Result<()> {
        let log_path = &self.settings.log_file;
        let log = File::create(log_path).map_err(|e| Error::io(log_path, e))?;

        let inspector = match env::var_os("JAVA_HOME") {
            Some(home) => SystemInspector::with_java_home(home),
            None => SystemInspector::new(),
        };

        let (stop_tx, stop_rx) = mpsc::channel();
        ctrlc::set_handler(move || {
            let _ = stop_tx.send(());
        })?;

        let mut sampler = Sampler::new(
            inspector,
            BufWriter::new(log),
            self.settings.watched_processes.clone(),
            self.settings.interval(),
        );
        sampler.write_header(chrono::Local::now().format(HEADER_TIME_FORMAT))?;
        sampler.run(&stop_rx)
    }

    /// Stops the sampler if one is running, then renders the artifacts and
    /// the report. The report goes to `summary` or, without one, stdout.
    pub fn cleanup(&self, summary: Option<&Path>) -> Result<ReportStats> {
        self.stop_sampler();

        let history = MemoryHistory::parse(&read_log(&self.settings.log_file)?);
        info!(
            "parsed {} series over {} timestamps",
            history.series_count(),
            history.timeline().len()
        );

        let diagram = self.write_artifacts(&history)?;
        let stats = ReportStats::from_history(&history);
        let report = compose_report(&stats, &diagram, &self.settings.chart_file);

        match summary {
            Some(path) => {
                append_to_sink(path, &report)?;
                info!("summary appended to {}", path.display());
            }
            None => print!("{}", report),
        }
        Ok(stats)
    }

    /// Best effort. Nothing here stops the report from being produced.
    fn stop_sampler(&self) {
        let pid_file = &self.settings.pid_file;
        let mut handle = match SamplerHandle::from_pid_file(pid_file) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                info!("no pid file at {}, nothing to stop", pid_file.display());
                return;
            }
            Err(e) => {
                warn!("could not read pid file: {}", e);
                return;
            }
        };

        if let Err(e) = handle.request_stop() {
            warn!("could not stop sampler: {}", e);
        } else if handle.wait_for_exit(self.settings.stop_timeout()) {
            info!("sampler {} stopped", handle.pid());
        } else {
            warn!(
                "sampler {} still running after {:?}",
                handle.pid(),
                self.settings.stop_timeout()
            );
        }

        if let Err(e) = remove_if_present(pid_file) {
            warn!("{}", e);
        }
    }

    /// Writes the chart and the diagram. Returns the diagram for the report.
    pub fn write_artifacts(&self, history: &MemoryHistory) -> Result<Flowchart> {
        let out = &self.settings.output_dir;
        fs::create_dir_all(out).map_err(|e| Error::io(out, e))?;

        let chart_path = self.settings.chart_path();
        let svg = render_svg(history)?;
        fs::write(&chart_path, svg).map_err(|e| Error::io(&chart_path, e))?;
        info!("chart written to {}", chart_path.display());

        let diagram = Flowchart::from_history(history);
        let diagram_path = self.settings.diagram_path();
        fs::write(&diagram_path, diagram.to_string()).map_err(|e| Error::io(&diagram_path, e))?;
        info!("diagram written to {}", diagram_path.display());

        Ok(diagram)
    }
}

/// Reads the monitor log. A log that was never created reads as empty.
pub fn read_log(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("no monitor log at {}, reporting no data", path.display());
            Ok(String::new())
        }
        Err(e) => Err(Error::io(path, e)),
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}
