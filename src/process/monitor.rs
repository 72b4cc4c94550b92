use super::{GcCounters, ProcessInfo, ProcessInspector};
use crate::error::{Error, Result};
use log::trace;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// JVM options whose value is the following argument.
const OPTIONS_WITH_VALUE: [&str; 8] = [
    "-cp",
    "-classpath",
    "--class-path",
    "-p",
    "--module-path",
    "--add-modules",
    "--add-opens",
    "--add-exports",
];

/// Inspects the processes of the local machine.
///
/// Listing and RSS come from sysinfo; heap counters from `jstat`.
#[derive(Debug)]
pub struct SystemInspector {
    system: System,
    jstat: OsString,
}

impl Default for SystemInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemInspector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            jstat: OsString::from("jstat"),
        }
    }

    /// Uses `$JAVA_HOME/bin/jstat` instead of whatever is on `PATH`.
    pub fn with_java_home(java_home: impl AsRef<Path>) -> Self {
        Self {
            system: System::new(),
            jstat: java_home.as_ref().join("bin").join("jstat").into_os_string(),
        }
    }

    fn display_name(process: &sysinfo::Process) -> String {
        jvm_main_class(process.cmd())
            .unwrap_or_else(|| process.name().to_string_lossy().into_owned())
    }
}

impl ProcessInspector for SystemInspector {
    fn list_processes(&mut self) -> Result<Vec<ProcessInfo>> {
        // Names and command lines only; RSS is read per matched pid.
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::OnlyIfNotSet),
        );
        let mut processes: Vec<_> = self
            .system
            .processes()
            .values()
            .filter(|p| p.thread_kind().is_none())
            .map(|p| ProcessInfo::new(p.pid().as_u32(), Self::display_name(p)))
            .collect();
        processes.sort_by_key(|p| p.pid);
        Ok(processes)
    }

    fn gc_counters(&mut self, pid: u32) -> Result<GcCounters> {
        let output = Command::new(&self.jstat)
            .arg("-gc")
            .arg(pid.to_string())
            .output()
            .map_err(|e| Error::Command {
                program: self.jstat.to_string_lossy().into_owned(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            trace!(
                "jstat -gc {} exited with {}: {}",
                pid,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(Error::unavailable(pid, "gc counters"));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut rows = stdout.lines().filter(|l| !l.trim().is_empty());
        match (rows.next(), rows.next()) {
            (Some(header), Some(values)) => GcCounters::from_jstat(header, values)
                .ok_or_else(|| Error::unavailable(pid, "gc counters")),
            _ => Err(Error::unavailable(pid, "gc counters")),
        }
    }

    fn resident_kb(&mut self, pid: u32) -> Result<u64> {
        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.system
            .process(sys_pid)
            .map(|p| p.memory() / 1024)
            .ok_or_else(|| Error::unavailable(pid, "resident memory"))
    }
}

/// Simple name of the main class of a `java` command line.
///
/// `java -cp x.jar -Xmx1g org.gradle.launcher.daemon.bootstrap.GradleDaemon 8.5`
/// yields `GradleDaemon`. Executable jars yield the jar's file stem.
pub fn jvm_main_class(cmd: &[OsString]) -> Option<String> {
    let (exe, args) = cmd.split_first()?;
    let exe_name = Path::new(exe).file_stem()?.to_string_lossy();
    if exe_name != "java" {
        return None;
    }

    let mut args = args.iter().map(|a| a.to_string_lossy());
    while let Some(arg) = args.next() {
        if arg == "-jar" {
            let jar = args.next()?;
            return Path::new(&*jar)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned());
        }
        if arg == "-m" || arg == "--module" {
            let module = args.next()?;
            let class = module.rsplit('/').next()?;
            return Some(simple_class_name(class));
        }
        if OPTIONS_WITH_VALUE.contains(&&*arg) {
            args.next();
            continue;
        }
        if arg.starts_with('-') || arg.starts_with('@') {
            continue;
        }
        return Some(simple_class_name(&arg));
    }
    None
}

fn simple_class_name(class: &str) -> String {
    class.rsplit('.').next().unwrap_or(class).to_string()
}
