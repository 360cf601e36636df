//! Error handling for botkeeper.
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the management commands.
///
/// Every variant is recovered by the binary and rendered as a status line; none
/// of them abort the CLI.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The recorded supervisor is still alive.
    #[error("Supervisor already running (PID {0})")]
    AlreadyRunning(u32),

    /// The bot directory is missing or unreadable.
    #[error("Bot directory unavailable: {}", .0.display())]
    DirectoryUnavailable(PathBuf),

    /// The supervisor died during the settle interval after launch.
    #[error("Supervisor (PID {0}) exited right after launch; check the supervisor log")]
    LaunchVerificationFailed(u32),

    /// A PID is recorded but the process is gone.
    #[error("Process {0} not found (stale PID record)")]
    ProcessNotFound(u32),

    /// The log file does not exist.
    #[error("Log file not found: {}", .0.display())]
    LogFileMissing(PathBuf),

    /// The command is not one of the recognized subcommands.
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// Error launching the supervisor process.
    #[error("Failed to launch supervisor: {0}")]
    LaunchError(#[source] std::io::Error),

    /// Error for PID file.
    #[error("PID file error: {0}")]
    PidFile(#[from] PidFileError),

    /// Error reading or writing the log file.
    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading or accessing a configuration file.
    #[error("Failed to read config file {}: {source}", path.display())]
    ReadError {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// `${VAR}` referenced a variable that is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// The environment-reference pattern failed to compile.
    #[error("Invalid expansion pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A duration field could not be parsed.
    #[error("Invalid duration value: '{0}'")]
    InvalidDuration(String),

    /// A required field is empty.
    #[error("Configuration field '{0}' must not be empty")]
    EmptyField(&'static str),
}

/// Error type for PID file operations.
#[derive(Debug, Error)]
pub enum PidFileError {
    /// Error reading or writing a PID file.
    #[error("Failed to access PID file {}: {source}", path.display())]
    Io {
        /// The PID file path.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The PID file does not hold a single integer.
    #[error("Failed to parse PID file {}: {contents:?}", path.display())]
    ParseError {
        /// The PID file path.
        path: PathBuf,
        /// The offending contents.
        contents: String,
    },
}

/// Errors emitted by the restart supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Waiting on the target failed.
    #[error("Failed to wait for target process: {0}")]
    Wait(#[source] std::io::Error),

    /// Signal handlers could not be installed.
    #[error("Failed to install signal handler: {0}")]
    Signal(String),
}

impl From<ctrlc::Error> for SupervisorError {
    fn from(err: ctrlc::Error) -> Self {
        SupervisorError::Signal(err.to_string())
    }
}

impl From<nix::errno::Errno> for SupervisorError {
    fn from(err: nix::errno::Errno) -> Self {
        SupervisorError::Signal(err.to_string())
    }
}
