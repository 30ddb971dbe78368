//! File side of the `logging` section: where the log file lives, size-based
//! rotation and a writer that copies log output to the console and the file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::settings::config::LoggingConfig;

const BYTES_PER_MB: u64 = 1024 * 1024;

impl LoggingConfig {
    /// Log file to write, or `None` when file logging is off.
    pub fn file_path(&self) -> Option<PathBuf> {
        if !self.log_to_file || self.log_file.trim().is_empty() {
            return None;
        }
        Some(PathBuf::from(&self.log_file))
    }

    /// Size past which the file is rotated; `None` when rotation is off.
    pub fn rotation_limit(&self) -> Option<u64> {
        (self.log_rotation && self.max_log_size > 0).then(|| u64::from(self.max_log_size) * BYTES_PER_MB)
    }
}

/// `<file>.1`, the single kept generation.
pub fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".1");
    PathBuf::from(name)
}

/// Opens the configured log file for appending, creating its directory and
/// rotating it first when it has reached the size limit.
pub fn open_log_file(config: &LoggingConfig) -> io::Result<Option<File>> {
    let Some(path) = config.file_path() else {
        return Ok(None);
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    if let (Some(limit), Ok(meta)) = (config.rotation_limit(), fs::metadata(&path)) {
        if meta.len() >= limit {
            fs::rename(&path, rotated_path(&path))?;
        }
    }
    OpenOptions::new().create(true).append(true).open(&path).map(Some)
}

/// Writes everything to both `primary` and `copy`. Errors on the copy are
/// dropped so a full disk never silences the console.
pub struct Tee<A, B> {
    primary: A,
    copy: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    pub fn new(primary: A, copy: B) -> Self {
        Self { primary, copy }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.primary.write_all(buf)?;
        let _ = self.copy.write_all(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.copy.flush();
        self.primary.flush()
    }
}
