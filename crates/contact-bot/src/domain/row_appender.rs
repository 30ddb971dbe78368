use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppendError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("spreadsheet request failed: {0}")]
    Request(String),
    #[error("spreadsheet rejected the row ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Destination for completed contact rows.
pub trait RowAppender: Send {
    fn append_row(&mut self, row: &[String]) -> Result<(), AppendError>;
}
