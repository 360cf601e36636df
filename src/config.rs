//! Configuration management for botkeeper.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    constants::{
        DEFAULT_LOG_FILE, DEFAULT_PID_FILE, DEFAULT_SUPERVISOR_LOG,
        DEFAULT_TARGET_PID_FILE, KILL_GRACE, RESTART_DELAY, RESTART_PAUSE,
        START_SETTLE, STOP_GRACE, SUPERVISE_SUBCOMMAND,
    },
    error::ConfigError,
    process::ProcessPattern,
};

/// Represents the structure of the configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    /// Directory holding the bot, its PID records, and its logs.
    bot_dir: String,
    /// Main-script filename, relative to `bot_dir`.
    script: String,
    /// Program used to run the script; the script is executed directly when absent.
    interpreter: Option<String>,
    /// Extra arguments appended after the script.
    #[serde(default)]
    args: Vec<String>,
    /// Extra environment for the target.
    #[serde(default)]
    env: HashMap<String, String>,
    pid_file: Option<String>,
    target_pid_file: Option<String>,
    log_file: Option<String>,
    supervisor_log: Option<String>,
    /// Argv tokens identifying the target in the process table.
    target_pattern: Option<Vec<String>>,
    /// Argv tokens identifying supervisor processes.
    supervisor_pattern: Option<Vec<String>>,
    #[serde(default)]
    timing: RawTiming,
}

#[derive(Debug, Default, Deserialize)]
struct RawTiming {
    restart_delay: Option<RawDuration>,
    start_settle: Option<RawDuration>,
    stop_grace: Option<RawDuration>,
    kill_grace: Option<RawDuration>,
    restart_pause: Option<RawDuration>,
}

/// A duration as written in YAML: `10` or `"10s"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

impl RawDuration {
    fn parse(&self) -> Result<Duration, ConfigError> {
        match self {
            RawDuration::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            RawDuration::Text(text) => parse_duration(text),
        }
    }
}

/// Delays used by the supervisor and the management commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timing {
    /// Wait between a crash and the next launch.
    pub restart_delay: Duration,
    /// Wait before verifying a freshly started supervisor.
    pub start_settle: Duration,
    /// SIGTERM to SIGKILL grace for the recorded supervisor.
    pub stop_grace: Duration,
    /// SIGTERM to SIGKILL grace for matched target processes.
    pub kill_grace: Duration,
    /// Pause between the two halves of `restart`.
    pub restart_pause: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            restart_delay: RESTART_DELAY,
            start_settle: START_SETTLE,
            stop_grace: STOP_GRACE,
            kill_grace: KILL_GRACE,
            restart_pause: RESTART_PAUSE,
        }
    }
}

impl Timing {
    /// All delays set to zero. Used by tests that drive the state machines directly.
    pub fn immediate() -> Self {
        Self {
            restart_delay: Duration::ZERO,
            start_settle: Duration::ZERO,
            stop_grace: Duration::ZERO,
            kill_grace: Duration::ZERO,
            restart_pause: Duration::ZERO,
        }
    }

    fn from_raw(raw: &RawTiming) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let pick = |value: &Option<RawDuration>, fallback: Duration| {
            value.as_ref().map(RawDuration::parse).unwrap_or(Ok(fallback))
        };

        Ok(Self {
            restart_delay: pick(&raw.restart_delay, defaults.restart_delay)?,
            start_settle: pick(&raw.start_settle, defaults.start_settle)?,
            stop_grace: pick(&raw.stop_grace, defaults.stop_grace)?,
            kill_grace: pick(&raw.kill_grace, defaults.kill_grace)?,
            restart_pause: pick(&raw.restart_pause, defaults.restart_pause)?,
        })
    }
}

/// Fully resolved configuration: every path is absolute and every delay parsed.
#[derive(Debug, Clone, Serialize)]
pub struct BotConfig {
    /// Absolute path of the configuration file this was loaded from.
    pub config_path: PathBuf,
    /// Bot working directory.
    pub bot_dir: PathBuf,
    /// Main-script filename as written in the configuration.
    pub script: String,
    /// Absolute path of the main script.
    pub script_path: PathBuf,
    pub interpreter: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Supervisor PID record.
    pub pid_file: PathBuf,
    /// Target PID record.
    pub target_pid_file: PathBuf,
    /// Target output log.
    pub log_file: PathBuf,
    /// Supervisor's own output.
    pub supervisor_log: PathBuf,
    pub target_pattern: ProcessPattern,
    pub supervisor_pattern: ProcessPattern,
    pub timing: Timing,
}

impl BotConfig {
    /// Program and arguments used to launch the target.
    pub fn target_command(&self) -> (String, Vec<String>) {
        let script = self.script_path.display().to_string();
        match &self.interpreter {
            Some(interpreter) => {
                let mut args = vec![script];
                args.extend(self.args.iter().cloned());
                (interpreter.clone(), args)
            }
            None => (script, self.args.clone()),
        }
    }
}

/// Expands `$VAR` and `${VAR}` references within a string.
fn expand_env_vars(re: &Regex, input: &str) -> Result<String, ConfigError> {
    if let Some(missing) = re
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .find(|name| env::var(name).is_err())
    {
        return Err(ConfigError::MissingEnvVar(missing));
    }

    let result = re.replace_all(input, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    });
    Ok(result.to_string())
}

/// Expands environment references in every string value of a parsed document.
/// Keys and comments are left alone.
fn expand_values(re: &Regex, value: &mut serde_yaml::Value) -> Result<(), ConfigError> {
    match value {
        serde_yaml::Value::String(text) => *text = expand_env_vars(re, text)?,
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                expand_values(re, item)?;
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for item in map.values_mut() {
                expand_values(re, item)?;
            }
        }
        serde_yaml::Value::Tagged(tagged) => expand_values(re, &mut tagged.value)?,
        _ => {}
    }
    Ok(())
}

/// Parses `500ms`, `10s`, `5m`, `2h`, or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidDuration(raw.to_string()));
    }

    if let Some(stripped) = value.strip_suffix("ms") {
        let amount: u64 = stripped
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidDuration(raw.to_string()))?;
        return Ok(Duration::from_millis(amount));
    }

    let (amount_str, multiplier) = if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = amount_str
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(raw.to_string()))?;

    Ok(Duration::from_secs(amount.saturating_mul(multiplier)))
}

fn resolve_against(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Loads and parses the configuration file, expanding environment variables and
/// resolving every relative path.
pub fn load_config(config_path: &Path) -> Result<BotConfig, ConfigError> {
    let content =
        fs::read_to_string(config_path).map_err(|source| ConfigError::ReadError {
            path: config_path.to_path_buf(),
            source,
        })?;

    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?")?;
    let mut document: serde_yaml::Value = serde_yaml::from_str(&content)?;
    expand_values(&re, &mut document)?;
    let raw: RawConfig = serde_yaml::from_value(document)?;

    if raw.bot_dir.trim().is_empty() {
        return Err(ConfigError::EmptyField("bot_dir"));
    }
    if raw.script.trim().is_empty() {
        return Err(ConfigError::EmptyField("script"));
    }

    let config_path = config_path
        .canonicalize()
        .unwrap_or_else(|_| config_path.to_path_buf());
    let config_dir = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let bot_dir = resolve_against(&config_dir, &raw.bot_dir);
    let script_path = resolve_against(&bot_dir, &raw.script);
    let in_bot_dir = |value: &Option<String>, fallback: &str| {
        resolve_against(&bot_dir, value.as_deref().unwrap_or(fallback))
    };

    let target_pattern = raw
        .target_pattern
        .clone()
        .map(ProcessPattern::new)
        .unwrap_or_else(|| {
            ProcessPattern::new(vec![script_path.display().to_string()])
        });
    let supervisor_pattern = raw
        .supervisor_pattern
        .clone()
        .map(ProcessPattern::new)
        .unwrap_or_else(|| {
            ProcessPattern::new(vec![
                SUPERVISE_SUBCOMMAND.to_string(),
                config_path.display().to_string(),
            ])
        });

    Ok(BotConfig {
        pid_file: in_bot_dir(&raw.pid_file, DEFAULT_PID_FILE),
        target_pid_file: in_bot_dir(&raw.target_pid_file, DEFAULT_TARGET_PID_FILE),
        log_file: in_bot_dir(&raw.log_file, DEFAULT_LOG_FILE),
        supervisor_log: in_bot_dir(&raw.supervisor_log, DEFAULT_SUPERVISOR_LOG),
        timing: Timing::from_raw(&raw.timing)?,
        target_pattern,
        supervisor_pattern,
        script: raw.script,
        interpreter: raw.interpreter,
        args: raw.args,
        env: raw.env,
        config_path,
        bot_dir,
        script_path,
    })
}
