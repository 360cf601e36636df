//! Command-line interface for botctl.
use std::{fmt::Write as _, path::PathBuf, str::FromStr};

use clap::{CommandFactory, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{
    config::BotConfig,
    constants::{DEFAULT_CONFIG_FILE, DEFAULT_LOG_LINES},
};

/// Log level accepted as a name ("info", "debug", ...) or a number (0-5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        const BY_NUMBER: [LevelFilter; 6] = [
            LevelFilter::OFF,
            LevelFilter::ERROR,
            LevelFilter::WARN,
            LevelFilter::INFO,
            LevelFilter::DEBUG,
            LevelFilter::TRACE,
        ];

        let trimmed = value.trim();
        if let Ok(number) = trimmed.parse::<usize>() {
            return BY_NUMBER
                .get(number)
                .copied()
                .map(LogLevelArg)
                .ok_or_else(|| format!("unsupported log level number '{number}' (expected 0-5)"));
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "off" => Ok(LevelFilter::OFF),
            "error" | "err" => Ok(LevelFilter::ERROR),
            "warn" | "warning" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(format!("invalid log level '{trimmed}'")),
        }
        .map(LogLevelArg)
    }
}

/// Command-line interface for botctl.
#[derive(Parser, Debug)]
#[command(name = "botctl", version)]
#[command(about = "Keeps a bot process running and manages it", long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for botctl.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Launch the supervisor in the background.
    Start,

    /// Stop the supervisor and every bot process.
    Stop,

    /// Stop, then start again.
    Restart,

    /// Show supervisor, bot process, and log status.
    Status {
        /// Emit machine-readable JSON output.
        #[arg(long)]
        json: bool,

        /// Disable ANSI colors in output.
        #[arg(long = "no-color")]
        no_color: bool,
    },

    /// Show the end of the bot log with line numbers.
    Log {
        /// Number of lines to show.
        #[arg(short = 'n', long, default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,
    },

    /// Truncate the bot log and list other log files.
    Clean,

    /// Run the restart loop in the foreground (used by `start`).
    #[command(hide = true)]
    Supervise,

    /// Anything else.
    #[command(external_subcommand)]
    Unknown(Vec<String>),
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Usage text listing every visible command and the active configuration.
pub fn usage_summary(config_path: &std::path::Path, config: Result<&BotConfig, String>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Usage: botctl [--config PATH] {{start|stop|restart|status|log|clean}}\n"
    );
    let _ = writeln!(out, "Commands:");

    let command = Cli::command();
    for sub in command.get_subcommands().filter(|sub| !sub.is_hide_set()) {
        let about = sub.get_about().map(|about| about.to_string()).unwrap_or_default();
        let _ = writeln!(out, "  {:<9}{}", sub.get_name(), about);
    }

    let _ = writeln!(out, "\nConfiguration ({}):", config_path.display());
    match config {
        Ok(config) => {
            let _ = writeln!(out, "  Bot directory: {}", config.bot_dir.display());
            let _ = writeln!(out, "  Script:        {}", config.script);
            let _ = writeln!(out, "  PID file:      {}", config.pid_file.display());
            let _ = writeln!(out, "  Log file:      {}", config.log_file.display());
        }
        Err(err) => {
            let _ = writeln!(out, "  unavailable: {err}");
        }
    }

    out
}
