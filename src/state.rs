//! Persisted supervision state: the two PID records and the log sink.
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::{config::BotConfig, error::PidFileError, logs::LogFile};

/// Which process a PID record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProcessRole {
    Supervisor,
    Target,
}

/// A single plain-text PID file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidRecord {
    role: ProcessRole,
    path: PathBuf,
}

impl PidRecord {
    pub fn new(role: ProcessRole, path: impl Into<PathBuf>) -> Self {
        Self {
            role,
            path: path.into(),
        }
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }

    /// Returns the PID file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the recorded PID, or `None` if no record exists.
    pub fn read(&self) -> Result<Option<u32>, PidFileError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PidFileError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        contents
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| PidFileError::ParseError {
                path: self.path.clone(),
                contents: contents.trim().to_string(),
            })
    }

    /// Overwrites the record with `pid`.
    pub fn write(&self, pid: u32) -> Result<(), PidFileError> {
        fs::write(&self.path, format!("{pid}\n")).map_err(|source| PidFileError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Deletes the record. Returns whether a file was removed.
    pub fn remove(&self) -> Result<bool, PidFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PidFileError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Everything the supervisor and the CLI share on disk.
#[derive(Debug, Clone)]
pub struct SupervisionState {
    pub supervisor: PidRecord,
    pub target: PidRecord,
    pub log: LogFile,
}

impl SupervisionState {
    pub fn new(supervisor: PidRecord, target: PidRecord, log: LogFile) -> Self {
        Self {
            supervisor,
            target,
            log,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(
            PidRecord::new(ProcessRole::Supervisor, &config.pid_file),
            PidRecord::new(ProcessRole::Target, &config.target_pid_file),
            LogFile::new(&config.log_file),
        )
    }
}
