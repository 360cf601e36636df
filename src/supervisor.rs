//! Restart supervisor: keeps the target program running.
//!
//! The loop is a small state machine. A target that exits with the shell codes
//! for SIGTERM (143) or SIGINT (130) is considered deliberately stopped and ends
//! the loop; every other exit, including a failed spawn, is followed by a fixed
//! delay and a relaunch. There is no restart ceiling.
use std::{
    collections::HashMap,
    io,
    os::unix::process::ExitStatusExt,
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use nix::sys::signal::{self, SigHandler, Signal};
use strum::Display;
use tracing::{debug, error, info, warn};

use crate::{
    config::BotConfig,
    constants::{EXIT_SIGINT, EXIT_SIGTERM, SIGNAL_EXIT_OFFSET, SLEEP_SLICE},
    error::SupervisorError,
    logs::LogFile,
    process::{Signaller, SystemProcessTable},
    state::{PidRecord, ProcessRole},
};

/// How an exit code is interpreted by the restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ExitClassification {
    /// The operator stopped the target with SIGTERM or SIGINT.
    NormalTermination,
    /// Anything else: a crash, a clean exit, or a failed launch.
    AbnormalTermination,
}

impl ExitClassification {
    pub fn from_code(code: i32) -> Self {
        match code {
            EXIT_SIGTERM | EXIT_SIGINT => ExitClassification::NormalTermination,
            _ => ExitClassification::AbnormalTermination,
        }
    }

    pub fn should_restart(&self) -> bool {
        matches!(self, ExitClassification::AbnormalTermination)
    }
}

/// Converts an exit status to a shell-style code (`128 + signo` for signalled children).
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signo)) => SIGNAL_EXIT_OFFSET + signo,
        (None, None) => -1,
    }
}

/// A restartable program.
pub trait Target {
    /// Starts a new instance and returns its PID.
    fn launch(&mut self) -> io::Result<u32>;

    /// Blocks until the current instance exits and returns its shell-style exit code.
    fn wait(&mut self) -> io::Result<i32>;
}

/// Target launched from the bot configuration with output appended to the log file.
#[derive(Debug)]
pub struct CommandTarget {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: PathBuf,
    log: LogFile,
    child: Option<Child>,
}

impl CommandTarget {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
        log: LogFile,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
            working_dir: working_dir.into(),
            log,
            child: None,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        let (program, args) = config.target_command();
        let mut target =
            Self::new(program, args, &config.bot_dir, LogFile::new(&config.log_file));
        target.env = config.env.clone();
        target
    }
}

impl Target for CommandTarget {
    fn launch(&mut self) -> io::Result<u32> {
        let stdout = self.log.open_append()?;
        let stderr = self.log.open_append()?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()?;

        let pid = child.id();
        self.child = Some(child);
        Ok(pid)
    }

    fn wait(&mut self) -> io::Result<i32> {
        let mut child = self.child.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no target process to wait for")
        })?;
        child.wait().map(exit_code)
    }
}

/// Shared between the supervisor loop and its signal handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    active_pid: Arc<AtomicU32>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// PID of the target currently running, if any.
    pub fn active_pid(&self) -> Option<u32> {
        match self.active_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    fn set_active(&self, pid: Option<u32>) {
        self.active_pid.store(pid.unwrap_or(0), Ordering::SeqCst);
    }
}

/// States of the restart loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Launching,
    Running { pid: u32 },
    Evaluating { code: i32 },
    Backoff,
    Stopped,
}

/// Runs a [`Target`] under the restart policy.
pub struct RestartSupervisor<T: Target> {
    target: T,
    record: PidRecord,
    restart_delay: Duration,
    shutdown: ShutdownHandle,
    launches: u64,
}

impl<T: Target> RestartSupervisor<T> {
    pub fn new(target: T, record: PidRecord, restart_delay: Duration) -> Self {
        Self {
            target,
            record,
            restart_delay,
            shutdown: ShutdownHandle::new(),
            launches: 0,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Number of launch attempts so far, including failed spawns.
    pub fn launches(&self) -> u64 {
        self.launches
    }

    /// Drives the loop until it reaches [`SupervisorState::Stopped`].
    pub fn run(&mut self) -> Result<(), SupervisorError> {
        let mut state = SupervisorState::Launching;
        while state != SupervisorState::Stopped {
            state = self.step(state)?;
        }
        info!("Supervisor stopped after {} launch(es)", self.launches);
        Ok(())
    }

    /// Performs one transition.
    pub fn step(
        &mut self,
        state: SupervisorState,
    ) -> Result<SupervisorState, SupervisorError> {
        if self.shutdown.is_requested() {
            return Ok(SupervisorState::Stopped);
        }

        match state {
            SupervisorState::Launching => {
                self.launches += 1;
                match self.target.launch() {
                    Ok(pid) => {
                        // Publish the PID first so a signal arriving now still reaches the child.
                        self.shutdown.set_active(Some(pid));
                        if let Err(err) = self.record.write(pid) {
                            warn!("Could not record target PID {pid}: {err}");
                        }
                        info!("Launched target (attempt {}, PID {pid})", self.launches);
                        Ok(SupervisorState::Running { pid })
                    }
                    Err(err) => {
                        error!("Failed to launch target (attempt {}): {err}", self.launches);
                        Ok(SupervisorState::Backoff)
                    }
                }
            }
            SupervisorState::Running { pid } => {
                debug!("Waiting for target PID {pid}");
                let code = self.target.wait().map_err(SupervisorError::Wait)?;
                self.shutdown.set_active(None);
                Ok(SupervisorState::Evaluating { code })
            }
            SupervisorState::Evaluating { code } => {
                let classification = ExitClassification::from_code(code);
                if classification.should_restart() {
                    warn!(
                        "Target exited with code {code} ({classification}); restarting in {:?}",
                        self.restart_delay
                    );
                    Ok(SupervisorState::Backoff)
                } else {
                    info!("Target exited with code {code} ({classification}); not restarting");
                    Ok(SupervisorState::Stopped)
                }
            }
            SupervisorState::Backoff => {
                if self.sleep_unless_shutdown(self.restart_delay) {
                    Ok(SupervisorState::Launching)
                } else {
                    Ok(SupervisorState::Stopped)
                }
            }
            SupervisorState::Stopped => Ok(SupervisorState::Stopped),
        }
    }

    /// Sleeps for `delay` in small slices. Returns `false` if shutdown was requested.
    fn sleep_unless_shutdown(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.shutdown.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Installs the supervisor's signal contract.
///
/// SIGINT and SIGTERM forward SIGTERM to the running target and exit the
/// process with status 0. SIGHUP is ignored so the supervisor survives the loss
/// of its controlling terminal.
pub fn install_signal_handlers(shutdown: ShutdownHandle) -> Result<(), SupervisorError> {
    ctrlc::set_handler(move || {
        info!("Termination requested; stopping target and exiting");
        shutdown.request();
        if let Some(pid) = shutdown.active_pid()
            && let Err(err) = SystemProcessTable::new().signal(pid, Signal::SIGTERM)
        {
            warn!("Failed to forward SIGTERM to target PID {pid}: {err}");
        }
        std::process::exit(0);
    })?;

    // ctrlc's termination feature also claims SIGHUP; override it.
    unsafe {
        signal::signal(Signal::SIGHUP, SigHandler::SigIgn)?;
    }

    Ok(())
}

/// Entry point of `botctl supervise`.
pub fn run_supervisor(config: &BotConfig) -> Result<(), SupervisorError> {
    let record = PidRecord::new(ProcessRole::Target, &config.target_pid_file);
    let mut supervisor = RestartSupervisor::new(
        CommandTarget::from_config(config),
        record,
        config.timing.restart_delay,
    );

    install_signal_handlers(supervisor.shutdown_handle())?;
    info!(
        "Supervising {} in {} (restart delay {:?})",
        config.script,
        config.bot_dir.display(),
        config.timing.restart_delay
    );
    supervisor.run()
}
