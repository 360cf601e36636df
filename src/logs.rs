//! Log file management: the append-only sink fed by the target and the
//! read/truncate helpers behind `status`, `log`, and `clean`.
use std::{
    collections::VecDeque,
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

use crate::constants::LOG_EXTENSION;

/// An append-only, line-oriented log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    path: PathBuf,
}

/// A numbered line returned by [`LogFile::tail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedLine {
    /// 1-based line number within the whole file.
    pub number: usize,
    pub text: String,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Opens the file for appending, creating it if needed.
    ///
    /// Each call returns an independent handle, so stdout and stderr of a child
    /// can share the file without buffering in between.
    pub fn open_append(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
    }

    /// Size in bytes.
    pub fn size(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Number of newline-terminated lines, plus a trailing partial line if any.
    pub fn line_count(&self) -> io::Result<usize> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut buf = [0u8; 8192];
        let mut count = 0;
        let mut last = b'\n';

        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            count += buf[..read].iter().filter(|byte| **byte == b'\n').count();
            last = buf[read - 1];
        }

        if last != b'\n' {
            count += 1;
        }
        Ok(count)
    }

    /// Returns the last `lines` lines with their line numbers, and the total line count.
    ///
    /// Only the requested tail is held in memory; read errors are returned.
    pub fn tail(&self, lines: usize) -> io::Result<(Vec<NumberedLine>, usize)> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut window: VecDeque<NumberedLine> = VecDeque::with_capacity(lines.min(1024));
        let mut raw = Vec::new();
        let mut total = 0;

        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            total += 1;
            if lines == 0 {
                continue;
            }
            if raw.last() == Some(&b'\n') {
                raw.pop();
            }
            if window.len() == lines {
                window.pop_front();
            }
            window.push_back(NumberedLine {
                number: total,
                text: String::from_utf8_lossy(&raw).into_owned(),
            });
        }

        Ok((window.into(), total))
    }

    /// Truncates the file to zero bytes and returns its previous size.
    pub fn truncate(&self) -> io::Result<u64> {
        let previous = self.size()?;
        OpenOptions::new().write(true).truncate(true).open(&self.path)?;
        Ok(previous)
    }

    /// Other `*.log` files in the same directory, sorted by path, with their sizes.
    pub fn sibling_logs(&self) -> io::Result<Vec<(PathBuf, u64)>> {
        let Some(dir) = self.path.parent() else {
            return Ok(Vec::new());
        };

        let mut siblings = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_log = path
                .extension()
                .is_some_and(|ext| ext == LOG_EXTENSION);
            if !is_log || path == self.path {
                continue;
            }
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                siblings.push((path, metadata.len()));
            }
        }
        siblings.sort();
        Ok(siblings)
    }
}

/// Formats a byte count as `B`, `K`, `M`, or `G` the way `du -h` does.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "K", "M", "G"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes}{}", UNITS[0])
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}
