//! Management commands: start, stop, restart, log, and clean.
//!
//! Each command returns a report instead of printing, so the binary decides how
//! to render it and tests can assert on it directly.
use std::{
    ffi::OsString,
    fs, io,
    os::unix::process::CommandExt,
    path::PathBuf,
    process::{Command, Stdio},
    thread,
};

use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

use crate::{
    config::BotConfig,
    constants::SUPERVISE_SUBCOMMAND,
    error::ControlError,
    logs::{LogFile, NumberedLine},
    process::{ProcessLocator, Signaller},
    state::SupervisionState,
    status::StatusReport,
};

/// Starts a supervisor process and returns its PID.
pub trait SupervisorLauncher {
    fn launch(&self) -> Result<u32, ControlError>;
}

/// Launches `botctl supervise` in its own session, detached from the terminal.
#[derive(Debug, Clone)]
pub struct DetachedLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    working_dir: PathBuf,
    log: LogFile,
}

impl DetachedLauncher {
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<OsString>,
        working_dir: impl Into<PathBuf>,
        log: LogFile,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
            log,
        }
    }

    /// Re-invokes the current executable as `--config <path> [--log-level L] supervise`.
    pub fn for_config(config: &BotConfig, log_level: Option<&str>) -> io::Result<Self> {
        let program = std::env::current_exe()?;
        let mut args: Vec<OsString> =
            vec!["--config".into(), config.config_path.clone().into_os_string()];
        if let Some(level) = log_level {
            args.push("--log-level".into());
            args.push(level.into());
        }
        args.push(SUPERVISE_SUBCOMMAND.into());

        Ok(Self::new(
            program,
            args,
            &config.bot_dir,
            LogFile::new(&config.supervisor_log),
        ))
    }
}

impl SupervisorLauncher for DetachedLauncher {
    fn launch(&self) -> Result<u32, ControlError> {
        let stdout = self.log.open_append().map_err(ControlError::LaunchError)?;
        let stderr = self.log.open_append().map_err(ControlError::LaunchError)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid().map_err(io::Error::from)?;
                Ok(())
            });
        }

        let child = command.spawn().map_err(ControlError::LaunchError)?;
        debug!("Spawned detached supervisor {:?} as PID {}", self.program, child.id());
        Ok(child.id())
    }
}

/// Outcome of a successful `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    pub pid: u32,
    /// PID of a dead supervisor whose record was replaced.
    pub replaced_stale: Option<u32>,
}

/// Outcome of `stop`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Recorded supervisor that was alive and has been signalled.
    pub supervisor: Option<u32>,
    /// Whether the recorded supervisor needed SIGKILL.
    pub supervisor_forced: bool,
    /// Recorded supervisor PID that was already gone.
    pub stale_record: Option<u32>,
    /// Target processes sent SIGTERM.
    pub targets: Vec<u32>,
    /// Target processes that survived the grace period and were sent SIGKILL.
    pub forced_targets: Vec<u32>,
    /// Unrecorded supervisor processes sent SIGTERM.
    pub stray_supervisors: Vec<u32>,
    /// PID records that could not be removed. Shutdown continues past them.
    pub record_errors: Vec<String>,
}

impl StopReport {
    pub fn stopped_anything(&self) -> bool {
        self.supervisor.is_some()
            || !self.targets.is_empty()
            || !self.stray_supervisors.is_empty()
    }
}

/// Outcome of `restart`: the stop half always runs; the start half may fail.
#[derive(Debug)]
pub struct RestartReport {
    pub stop: StopReport,
    pub start: Result<StartReport, ControlError>,
}

/// Outcome of `log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReport {
    pub path: PathBuf,
    pub lines: Vec<NumberedLine>,
    pub total_lines: usize,
}

/// Outcome of `clean`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanReport {
    pub path: PathBuf,
    /// Size before truncation; `None` if the log did not exist.
    pub previous_size: Option<u64>,
    /// Other `*.log` files in the bot directory, untouched.
    pub other_logs: Vec<(PathBuf, u64)>,
}

/// Runs management commands against one bot directory.
pub struct Manager<P, L> {
    config: BotConfig,
    state: SupervisionState,
    processes: P,
    launcher: L,
}

impl<P, L> Manager<P, L>
where
    P: ProcessLocator + Signaller,
    L: SupervisorLauncher,
{
    pub fn new(config: BotConfig, processes: P, launcher: L) -> Self {
        let state = SupervisionState::from_config(&config);
        Self {
            config,
            state,
            processes,
            launcher,
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn state(&self) -> &SupervisionState {
        &self.state
    }

    fn ensure_bot_dir(&self) -> Result<(), ControlError> {
        let dir = &self.config.bot_dir;
        match fs::read_dir(dir) {
            Ok(_) => Ok(()),
            Err(err) => {
                debug!("Bot directory {} unavailable: {err}", dir.display());
                Err(ControlError::DirectoryUnavailable(dir.clone()))
            }
        }
    }

    /// Reads the supervisor record, treating an unreadable record as absent.
    fn recorded_supervisor(&self) -> Option<u32> {
        match self.state.supervisor.read() {
            Ok(pid) => pid,
            Err(err) => {
                warn!("Ignoring unreadable supervisor PID record: {err}");
                None
            }
        }
    }

    fn send(&self, pid: u32, signal: Signal) {
        debug!("Sending {signal} to PID {pid}");
        if let Err(err) = self.processes.signal(pid, signal) {
            warn!("Failed to send {signal} to PID {pid}: {err}");
        }
    }

    /// Launches the supervisor unless one is already alive.
    pub fn start(&self) -> Result<StartReport, ControlError> {
        self.ensure_bot_dir()?;

        let mut replaced_stale = None;
        if let Some(pid) = self.recorded_supervisor() {
            if self.processes.is_alive(pid) {
                return Err(ControlError::AlreadyRunning(pid));
            }
            info!("Replacing stale supervisor record for PID {pid}");
            replaced_stale = Some(pid);
        }

        let pid = self.launcher.launch()?;
        self.state.supervisor.write(pid)?;
        info!("Supervisor launched as PID {pid}; verifying");

        thread::sleep(self.config.timing.start_settle);
        if !self.processes.is_alive(pid) {
            self.state.supervisor.remove()?;
            return Err(ControlError::LaunchVerificationFailed(pid));
        }

        Ok(StartReport {
            pid,
            replaced_stale,
        })
    }

    /// Best-effort shutdown of the recorded supervisor, every target process, and
    /// every stray supervisor process.
    pub fn stop(&self) -> Result<StopReport, ControlError> {
        let timing = self.config.timing;
        let mut report = StopReport::default();

        if let Some(pid) = self.recorded_supervisor() {
            if self.processes.is_alive(pid) {
                info!("Stopping supervisor PID {pid}");
                self.send(pid, Signal::SIGTERM);
                thread::sleep(timing.stop_grace);
                if self.processes.is_alive(pid) {
                    warn!("Supervisor PID {pid} ignored SIGTERM; sending SIGKILL");
                    self.send(pid, Signal::SIGKILL);
                    report.supervisor_forced = true;
                }
                report.supervisor = Some(pid);
            } else {
                debug!("Supervisor record points at dead PID {pid}");
                report.stale_record = Some(pid);
            }
        }
        if let Err(err) = self.state.supervisor.remove() {
            warn!("Could not remove supervisor PID record: {err}");
            report.record_errors.push(err.to_string());
        }

        let targets = self.processes.find_by_pattern(&self.config.target_pattern);
        if !targets.is_empty() {
            info!("Stopping {} target process(es): {targets:?}", targets.len());
            for pid in &targets {
                self.send(*pid, Signal::SIGTERM);
            }
            thread::sleep(timing.kill_grace);
            for pid in targets.iter().filter(|pid| self.processes.is_alive(**pid)) {
                warn!("Target PID {pid} survived SIGTERM; sending SIGKILL");
                self.send(*pid, Signal::SIGKILL);
                report.forced_targets.push(*pid);
            }
        }
        report.targets = targets;
        if let Err(err) = self.state.target.remove() {
            warn!("Could not remove target PID record: {err}");
            report.record_errors.push(err.to_string());
        }

        let strays: Vec<u32> = self
            .processes
            .find_by_pattern(&self.config.supervisor_pattern)
            .into_iter()
            .filter(|pid| Some(*pid) != report.supervisor)
            .collect();
        for pid in &strays {
            info!("Stopping unrecorded supervisor PID {pid}");
            self.send(*pid, Signal::SIGTERM);
        }
        report.stray_supervisors = strays;

        Ok(report)
    }

    /// Stop, pause, start. A failed start leaves everything stopped.
    pub fn restart(&self) -> Result<RestartReport, ControlError> {
        let stop = self.stop()?;
        thread::sleep(self.config.timing.restart_pause);
        let start = self.start();
        Ok(RestartReport { stop, start })
    }

    /// Read-only liveness report.
    pub fn status(&self) -> StatusReport {
        StatusReport::collect(&self.state, &self.config.target_pattern, &self.processes)
    }

    /// Last `lines` lines of the bot log.
    pub fn log(&self, lines: usize) -> Result<LogReport, ControlError> {
        self.ensure_bot_dir()?;
        let log = &self.state.log;
        if !log.exists() {
            return Err(ControlError::LogFileMissing(log.path().to_path_buf()));
        }

        let (lines, total_lines) = log.tail(lines)?;
        Ok(LogReport {
            path: log.path().to_path_buf(),
            lines,
            total_lines,
        })
    }

    /// Truncates the bot log and lists the other logs beside it.
    pub fn clean(&self) -> Result<CleanReport, ControlError> {
        self.ensure_bot_dir()?;
        let log = &self.state.log;

        let previous_size = if log.exists() {
            let size = log.truncate()?;
            info!("Truncated {} ({size} bytes)", log.path().display());
            Some(size)
        } else {
            None
        };

        Ok(CleanReport {
            path: log.path().to_path_buf(),
            previous_size,
            other_logs: log.sibling_logs()?,
        })
    }
}
