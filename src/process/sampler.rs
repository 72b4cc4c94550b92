use std::fmt::Display;
use std::io::Write;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::{HeapUsage, ProcessInfo, ProcessInspector};
use crate::error::{Error, Result};
use crate::metrics::{round1, Elapsed, Sample, LOG_COLUMNS};

/// Periodically records the memory of watched processes into a log.
pub struct Sampler<I, W> {
    inspector: I,
    log: W,
    watched: Vec<String>,
    interval: Duration,
    started: Instant,
}

impl<I: ProcessInspector, W: Write> Sampler<I, W> {
    pub fn new(inspector: I, log: W, watched: Vec<String>, interval: Duration) -> Self {
        Self {
            inspector,
            log,
            watched,
            interval,
            started: Instant::now(),
        }
    }

    /// Writes the run header and the column header.
    pub fn write_header(&mut self, started_at: impl Display) -> Result<()> {
        writeln!(self.log, "Starting memory monitor at {}", started_at).map_err(Error::Log)?;
        writeln!(self.log, "{}", LOG_COLUMNS).map_err(Error::Log)?;
        self.log.flush().map_err(Error::Log)
    }

    pub fn is_watched(&self, name: &str) -> bool {
        self.watched.iter().any(|w| w == name)
    }

    /// Reads one process. Any failed read makes the whole sample unavailable.
    pub fn sample_process(&mut self, process: &ProcessInfo, elapsed: Elapsed) -> Result<Sample> {
        let counters = self.inspector.gc_counters(process.pid)?;
        let heap = HeapUsage::from_counters(&counters)
            .ok_or_else(|| Error::unavailable(process.pid, "heap counters"))?;
        let rss_kb = self.inspector.resident_kb(process.pid)?;

        Ok(Sample {
            elapsed,
            pid: process.pid,
            name: process.name.clone(),
            heap_used_mb: heap.used_mb,
            heap_capacity_mb: heap.capacity_mb,
            rss_mb: round1(rss_kb as f64 / 1024.0),
        })
    }

    /// Runs one tick stamped with `elapsed` and returns how many records
    /// were written.
    pub fn tick_at(&mut self, elapsed: Elapsed) -> Result<usize> {
        let processes = match self.inspector.list_processes() {
            Ok(processes) => processes,
            Err(e) => {
                warn!("could not list processes at {}: {}", elapsed, e);
                return Ok(0);
            }
        };

        let targets: Vec<ProcessInfo> = processes
            .into_iter()
            .filter(|p| self.is_watched(&p.name))
            .collect();

        let mut written = 0;
        for process in &targets {
            match self.sample_process(process, elapsed) {
                Ok(sample) => {
                    writeln!(self.log, "{}", sample.to_log_line()).map_err(Error::Log)?;
                    written += 1;
                }
                Err(e) => debug!("skipping {} ({}) at {}: {}", process.name, process.pid, elapsed, e),
            }
        }
        self.log.flush().map_err(Error::Log)?;
        Ok(written)
    }

    pub fn tick(&mut self) -> Result<usize> {
        let elapsed = Elapsed::from(self.started.elapsed());
        self.tick_at(elapsed)
    }

    /// Ticks until `stop` fires or its sender goes away.
    ///
    /// A stop request arriving mid-tick takes effect once the tick is
    /// written.
    pub fn run(&mut self, stop: &Receiver<()>) -> Result<()> {
        info!("sampling {:?} every {:?}", self.watched, self.interval);
        loop {
            let written = self.tick()?;
            debug!("tick wrote {} records", written);

            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("sampler stopped after {}", Elapsed::from(self.started.elapsed()));
        Ok(())
    }

    pub fn into_log(self) -> W {
        self.log
    }
}
