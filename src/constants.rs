//! Constants and default configuration values for botkeeper.
//!
//! Timing defaults live here so that every delay in the supervisor and the
//! management commands can be overridden from configuration.

use std::time::Duration;

// ============================================================================
// File System Defaults
// ============================================================================

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "botctl.yaml";

/// Default supervisor PID record, relative to the bot directory.
pub const DEFAULT_PID_FILE: &str = "bot.pid";

/// Default target PID record, relative to the bot directory.
/// Owned by the supervisor and overwritten on every launch.
pub const DEFAULT_TARGET_PID_FILE: &str = "bot_process.pid";

/// Default log file receiving the target's stdout and stderr.
pub const DEFAULT_LOG_FILE: &str = "bot.log";

/// Default file receiving the supervisor's own tracing output.
pub const DEFAULT_SUPERVISOR_LOG: &str = "supervisor.log";

/// Extension of files listed by `clean`.
pub const LOG_EXTENSION: &str = "log";

// ============================================================================
// Process Management Timing
// ============================================================================

/// Delay between a crash of the target and its relaunch.
pub const RESTART_DELAY: Duration = Duration::from_secs(10);

/// Time given to a freshly launched supervisor before its liveness is verified.
pub const START_SETTLE: Duration = Duration::from_secs(3);

/// Grace period between SIGTERM and SIGKILL for the recorded supervisor.
pub const STOP_GRACE: Duration = Duration::from_secs(2);

/// Grace period between SIGTERM and SIGKILL for matched target processes.
pub const KILL_GRACE: Duration = Duration::from_secs(1);

/// Pause between the stop and start phases of `restart`.
pub const RESTART_PAUSE: Duration = Duration::from_secs(3);

/// Slice used when sleeping so that shutdown requests are noticed promptly.
pub const SLEEP_SLICE: Duration = Duration::from_millis(100);

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit code reported by a shell for a child terminated by SIGTERM (128 + 15).
pub const EXIT_SIGTERM: i32 = 143;

/// Exit code reported by a shell for a child terminated by SIGINT (128 + 2).
pub const EXIT_SIGINT: i32 = 130;

/// Offset added to a signal number to form a shell-style exit code.
pub const SIGNAL_EXIT_OFFSET: i32 = 128;

// ============================================================================
// Logging and Output Constants
// ============================================================================

/// Number of lines printed by `log` when no count is given.
pub const DEFAULT_LOG_LINES: usize = 30;

/// Subcommand name used to run the restart supervisor.
pub const SUPERVISE_SUBCOMMAND: &str = "supervise";
