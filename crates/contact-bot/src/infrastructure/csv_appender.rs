use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::row_appender::{AppendError, RowAppender};

pub const HEADER: [&str; 6] = ["Denumire", "Telefon", "Email", "Descriere", "Autor", "Data"];

/// Appends rows to a local CSV file, writing the header when the file is new
/// or empty.
pub struct CsvAppender {
    path: PathBuf,
}

impl CsvAppender {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> AppendError {
        AppendError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl RowAppender for CsvAppender {
    fn append_row(&mut self, row: &[String]) -> Result<(), AppendError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        let mut out = String::new();
        let is_empty = file.metadata().map_err(|e| self.io_error(e))?.len() == 0;
        if is_empty {
            out.push_str(&encode_line(HEADER.iter().copied()));
        }
        out.push_str(&encode_line(row.iter().map(String::as_str)));
        file.write_all(out.as_bytes()).map_err(|e| self.io_error(e))
    }
}

fn encode_line<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut line = fields.map(encode_field).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

/// RFC 4180 quoting: fields containing a comma, quote or line break are
/// wrapped in quotes with inner quotes doubled.
fn encode_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
