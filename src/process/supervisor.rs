use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Records the current process id in `path`.
pub fn write_pid_file(path: &Path) -> Result<()> {
    fs::write(path, format!("{}\n", std::process::id())).map_err(|e| Error::io(path, e))
}

/// Reads a pid file. A missing file is `Ok(None)`.
pub fn read_pid_file(path: &Path) -> Result<Option<u32>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };
    text.trim().parse::<u32>().map(Some).map_err(|e| {
        Error::io(path, io::Error::new(io::ErrorKind::InvalidData, e))
    })
}

/// Polls for `path` to hold a pid, giving up after `grace`.
pub fn wait_for_pid_file(path: &Path, grace: Duration) -> Result<u32> {
    let deadline = Instant::now() + grace;
    loop {
        // The writer may not have finished the line yet; retry on bad content.
        if let Ok(Some(pid)) = read_pid_file(path) {
            return Ok(pid);
        }
        if Instant::now() >= deadline {
            return Err(Error::StartupTimeout {
                pid_file: path.to_path_buf(),
                waited: grace,
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// A sampler running as its own OS process.
///
/// Either spawned by us (and then reaped by us) or adopted from a pid file
/// written by an earlier invocation.
#[derive(Debug)]
pub struct SamplerHandle {
    pid: Pid,
    child: Option<Child>,
}

impl SamplerHandle {
    /// Starts `program args…` detached from our process group, with both
    /// output streams going to `startup_log`.
    pub fn spawn<S: AsRef<OsStr>>(program: &Path, args: &[S], startup_log: &Path) -> Result<Self> {
        let out = File::create(startup_log).map_err(|e| Error::io(startup_log, e))?;
        let err = out.try_clone().map_err(|e| Error::io(startup_log, e))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(out)
            .stderr(err)
            .process_group(0)
            .spawn()
            .map_err(|e| Error::io(program, e))?;

        let pid = Pid::from_raw(child.id() as i32);
        debug!("spawned {} as pid {}", program.display(), pid);
        Ok(Self {
            pid,
            child: Some(child),
        })
    }

    pub fn from_pid(pid: u32) -> Self {
        Self {
            pid: Pid::from_raw(pid as i32),
            child: None,
        }
    }

    /// Adopts the process named by a pid file, if there is one.
    pub fn from_pid_file(path: &Path) -> Result<Option<Self>> {
        Ok(read_pid_file(path)?.map(Self::from_pid))
    }

    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    pub fn is_alive(&mut self) -> bool {
        if let Some(child) = self.child.as_mut() {
            return matches!(child.try_wait(), Ok(None));
        }
        // Signal 0 only checks for existence. EPERM means it exists but is
        // not ours to signal.
        matches!(kill(self.pid, None), Ok(()) | Err(Errno::EPERM))
    }

    /// Sends SIGTERM. The sampler finishes its current tick and exits.
    pub fn request_stop(&self) -> Result<()> {
        info!("requesting sampler {} to stop", self.pid);
        kill(self.pid, Signal::SIGTERM).map_err(|source| Error::Signal {
            pid: self.pid.as_raw(),
            source,
        })
    }

    /// Waits up to `timeout` for the process to go away.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_alive() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.pid");

        assert_eq!(read_pid_file(&path).unwrap(), None);
        write_pid_file(&path).unwrap();
        assert_eq!(read_pid_file(&path).unwrap(), Some(std::process::id()));
    }

    #[test]
    fn garbage_pid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.pid");
        fs::write(&path, "not a pid").unwrap();
        assert!(matches!(read_pid_file(&path), Err(Error::Io { .. })));
    }

    #[test]
    fn waiting_for_missing_pid_file_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.pid");
        let err = wait_for_pid_file(&path, Duration::from_millis(250)).unwrap_err();
        assert!(matches!(err, Error::StartupTimeout { .. }));
    }

    #[test]
    fn waiting_sees_late_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.pid");
        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            fs::write(writer_path, "4242\n").unwrap();
        });
        assert_eq!(wait_for_pid_file(&path, Duration::from_secs(5)).unwrap(), 4242);
        writer.join().unwrap();
    }

    #[test]
    fn spawned_process_stops_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("startup.log");
        let mut handle = SamplerHandle::spawn(Path::new("sleep"), &["30"], &log).unwrap();

        assert!(handle.is_alive());
        handle.request_stop().unwrap();
        assert!(handle.wait_for_exit(Duration::from_secs(5)));
        assert!(!handle.is_alive());
    }

    #[test]
    fn signalling_a_missing_process_fails() {
        let handle = SamplerHandle::from_pid(i32::MAX as u32);
        assert!(matches!(handle.request_stop(), Err(Error::Signal { .. })));
        let mut handle = handle;
        assert!(!handle.is_alive());
    }
}
