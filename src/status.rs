//! Read-only status report for the supervisor, the target, and the log.
use std::{fmt::Write as _, path::PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::debug;

use crate::{
    error::ControlError,
    logs::format_size,
    process::{ProcessLocator, ProcessPattern, ProcessSnapshot, format_elapsed, format_etime},
    state::SupervisionState,
};

pub const GREEN_BOLD: &str = "\x1b[1;32m"; // Bright Green
pub const RED_BOLD: &str = "\x1b[1;31m"; // Bright Red
pub const MAGENTA_BOLD: &str = "\x1b[1;35m"; // Magenta
pub const YELLOW_BOLD: &str = "\x1b[1;33m"; // Yellow/Gold
pub const RESET: &str = "\x1b[0m"; // Reset color

/// Wraps `text` in `color` when colors are enabled.
pub fn paint(text: &str, color: &str, enabled: bool) -> String {
    if enabled {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Liveness of the recorded supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SupervisorStatus {
    /// Record present and process alive.
    Running {
        pid: u32,
        uptime_secs: u64,
        started_at: Option<String>,
    },
    /// Record present but the process is gone.
    Stale { pid: u32 },
    /// No record on disk.
    NotRecorded,
    /// Record present but unparsable.
    Unreadable { error: String },
}

/// Target processes found in the process table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetStatus {
    /// PID written by the supervisor on its latest launch.
    pub recorded_pid: Option<u32>,
    pub recorded_alive: bool,
    pub processes: Vec<ProcessSnapshot>,
}

/// Presence and size of the bot log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: Option<u64>,
    pub lines: Option<usize>,
}

/// Result of `status`: three independent checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub supervisor: SupervisorStatus,
    pub target: TargetStatus,
    pub log: LogStatus,
}

impl StatusReport {
    /// Gathers the report. Never writes to disk or signals anything.
    pub fn collect<P: ProcessLocator>(
        state: &SupervisionState,
        target_pattern: &ProcessPattern,
        processes: &P,
    ) -> Self {
        let supervisor = match state.supervisor.read() {
            Ok(Some(pid)) => match processes.inspect(pid) {
                Some(snapshot) => SupervisorStatus::Running {
                    pid,
                    uptime_secs: snapshot.elapsed_secs,
                    started_at: format_start_time(snapshot.start_time),
                },
                None => SupervisorStatus::Stale { pid },
            },
            Ok(None) => SupervisorStatus::NotRecorded,
            Err(err) => SupervisorStatus::Unreadable {
                error: err.to_string(),
            },
        };

        let recorded_pid = state.target.read().ok().flatten();
        let target = TargetStatus {
            recorded_pid,
            recorded_alive: recorded_pid.is_some_and(|pid| processes.is_alive(pid)),
            processes: processes
                .find_by_pattern(target_pattern)
                .into_iter()
                .filter_map(|pid| processes.inspect(pid))
                .collect(),
        };

        let log = &state.log;
        let exists = log.exists();
        let log = LogStatus {
            path: log.path().to_path_buf(),
            exists,
            size_bytes: exists.then(|| log.size().ok()).flatten(),
            lines: exists.then(|| log.line_count().ok()).flatten(),
        };
        debug!("Collected status: {:?}", supervisor);

        Self {
            supervisor,
            target,
            log,
        }
    }

    /// Human-readable rendering.
    pub fn render(&self, color: bool) -> String {
        let mut out = String::new();

        match &self.supervisor {
            SupervisorStatus::Running {
                pid,
                uptime_secs,
                started_at,
            } => {
                let _ = writeln!(
                    out,
                    "{}",
                    paint(&format!("● Supervisor running (PID {pid})"), GREEN_BOLD, color)
                );
                let since = started_at
                    .as_deref()
                    .map(|ts| format!(" since {ts};"))
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "   Active:{since} up {} ({})",
                    format_etime(*uptime_secs),
                    format_elapsed(*uptime_secs)
                );
            }
            SupervisorStatus::Stale { pid } => {
                let _ = writeln!(
                    out,
                    "{}",
                    paint(
                        &format!("● Supervisor not running: {}", ControlError::ProcessNotFound(*pid)),
                        YELLOW_BOLD,
                        color
                    )
                );
            }
            SupervisorStatus::NotRecorded => {
                let _ = writeln!(
                    out,
                    "{}",
                    paint("● Supervisor not running (no PID file)", RED_BOLD, color)
                );
            }
            SupervisorStatus::Unreadable { error } => {
                let _ = writeln!(
                    out,
                    "{}",
                    paint(&format!("● Supervisor state unknown: {error}"), RED_BOLD, color)
                );
            }
        }

        let count = self.target.processes.len();
        let headline = format!("● Bot processes: {count} running");
        let headline_color = if count > 0 { GREEN_BOLD } else { RED_BOLD };
        let _ = writeln!(out, "{}", paint(&headline, headline_color, color));
        for process in &self.target.processes {
            let _ = writeln!(
                out,
                "   {}PID {:>7}{}  {:>11}  {}",
                if color { MAGENTA_BOLD } else { "" },
                process.pid,
                if color { RESET } else { "" },
                format_etime(process.elapsed_secs),
                process.command
            );
        }
        if let Some(pid) = self.target.recorded_pid {
            let liveness = if self.target.recorded_alive {
                "alive"
            } else {
                "not running"
            };
            let _ = writeln!(out, "   Last launched PID: {pid} ({liveness})");
        }

        if self.log.exists {
            let size = self
                .log
                .size_bytes
                .map(format_size)
                .unwrap_or_else(|| "?".into());
            let lines = self
                .log
                .lines
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".into());
            let _ = writeln!(
                out,
                "● Log file: {} ({size}, {lines} lines)",
                self.log.path.display()
            );
        } else {
            let _ = writeln!(
                out,
                "{}",
                paint(
                    &format!("● Log file: {} not found", self.log.path.display()),
                    YELLOW_BOLD,
                    color
                )
            );
        }

        out
    }
}

fn format_start_time(epoch_secs: u64) -> Option<String> {
    let secs = i64::try_from(epoch_secs).ok()?;
    let utc = DateTime::from_timestamp(secs, 0)?;
    Some(
        utc.with_timezone(&Local)
            .format("%a %Y-%m-%d %H:%M:%S %Z")
            .to_string(),
    )
}
