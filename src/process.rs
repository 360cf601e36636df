//! Process table access: pattern lookup, liveness, inspection, and signalling.
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use serde::Serialize;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

#[cfg(target_os = "linux")]
use std::{fs, path::Path};

/// Argv tokens identifying a process.
///
/// A process matches when every token is exactly equal to one of its
/// arguments. Substring matching is deliberately not supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessPattern {
    tokens: Vec<String>,
}

impl ProcessPattern {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Returns `true` when every token appears verbatim in `argv`.
    /// An empty pattern matches nothing.
    pub fn matches<S: AsRef<str>>(&self, argv: &[S]) -> bool {
        !self.tokens.is_empty()
            && self
                .tokens
                .iter()
                .all(|token| argv.iter().any(|arg| arg.as_ref() == token))
    }
}

impl std::fmt::Display for ProcessPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}

/// Point-in-time view of a live process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    /// Seconds since the process started.
    pub elapsed_secs: u64,
    /// Start time in seconds since the UNIX epoch.
    pub start_time: u64,
    pub command: String,
}

/// Read access to the OS process table.
pub trait ProcessLocator {
    /// PIDs of every live process matching `pattern`, excluding the caller.
    fn find_by_pattern(&self, pattern: &ProcessPattern) -> Vec<u32>;

    /// Whether `pid` refers to a live, non-zombie process.
    fn is_alive(&self, pid: u32) -> bool;

    /// Details for display; `None` when the process is gone.
    fn inspect(&self, pid: u32) -> Option<ProcessSnapshot>;
}

/// Delivers signals to processes.
pub trait Signaller {
    /// Sends `signal` to `pid`. A process that has already exited is not an error.
    fn signal(&self, pid: u32, signal: Signal) -> Result<(), Errno>;
}

/// Production process table backed by `sysinfo` and `nix`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    pub fn new() -> Self {
        Self
    }

    fn snapshot_system() -> System {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );
        system
    }

    #[cfg(target_os = "linux")]
    fn read_proc_state(pid: u32) -> Option<char> {
        let stat_path_str = format!("/proc/{pid}/stat");
        let contents = fs::read_to_string(Path::new(&stat_path_str)).ok()?;
        // The command name is wrapped in parentheses and may contain spaces.
        let after_name = &contents[contents.rfind(')')? + 1..];
        after_name.trim_start().chars().next()
    }
}

impl ProcessLocator for SystemProcessTable {
    fn find_by_pattern(&self, pattern: &ProcessPattern) -> Vec<u32> {
        let own_pid = std::process::id();
        let system = Self::snapshot_system();

        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own_pid)
            // Linux lists every thread as a task; only thread-group leaders count.
            .filter(|(_, process)| process.thread_kind().is_none())
            .filter(|(_, process)| {
                let argv: Vec<String> = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect();
                pattern.matches(&argv)
            })
            .map(|(pid, _)| pid.as_u32())
            .filter(|pid| self.is_alive(*pid))
            .collect();
        pids.sort_unstable();
        pids
    }

    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }

        match signal::kill(Pid::from_raw(raw), None) {
            Ok(()) | Err(Errno::EPERM) => {}
            Err(_) => return false,
        }

        #[cfg(target_os = "linux")]
        {
            if let Some(state) = Self::read_proc_state(pid)
                && matches!(state, 'Z' | 'X')
            {
                return false;
            }
        }

        true
    }

    fn inspect(&self, pid: u32) -> Option<ProcessSnapshot> {
        if !self.is_alive(pid) {
            return None;
        }

        let mut system = System::new();
        let target = sysinfo::Pid::from_u32(pid);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );
        let process = system.process(target)?;

        let mut command = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        if command.is_empty() {
            command = process.name().to_string_lossy().into_owned();
        }

        Some(ProcessSnapshot {
            pid,
            elapsed_secs: process.run_time(),
            start_time: process.start_time(),
            command,
        })
    }
}

impl Signaller for SystemProcessTable {
    fn signal(&self, pid: u32, sig: Signal) -> Result<(), Errno> {
        let raw = i32::try_from(pid).map_err(|_| Errno::ESRCH)?;
        match signal::kill(Pid::from_raw(raw), Some(sig)) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Formats an elapsed duration the way `ps -o etime` does: `[[dd-]hh:]mm:ss`.
pub fn format_etime(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    if days > 0 {
        format!("{days}-{hours:02}:{minutes:02}:{seconds:02}")
    } else if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Human-readable relative age, e.g. `5 mins ago`.
pub fn format_elapsed(total_seconds: u64) -> String {
    match total_seconds {
        0..=59 => format!("{} secs ago", total_seconds),
        60..=3_599 => format!("{} mins ago", total_seconds / 60),
        3_600..=86_399 => format!("{} hours ago", total_seconds / 3_600),
        86_400..=604_799 => format!("{} days ago", total_seconds / 86_400),
        _ => format!("{} weeks ago", total_seconds / 604_800),
    }
}
