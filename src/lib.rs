//! Botkeeper keeps a single long-running bot process alive and gives operators a
//! small CLI to start, stop, restart, and inspect it. The restart supervisor
//! relaunches the bot after every unexpected exit; the management commands track
//! the supervisor through a PID file and the OS process table.

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Default paths, delays, and exit codes.
pub mod constants;

/// Management commands.
pub mod control;

/// Error handling.
pub mod error;

/// Logs management.
pub mod logs;

/// Process table access.
pub mod process;

/// PID records and the shared supervision state.
pub mod state;

/// Status reporting.
pub mod status;

/// Restart loop.
pub mod supervisor;

/// In-memory process table for tests.
pub mod test_utils;
