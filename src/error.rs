use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("assignment #{0} does not exist")]
    AssignmentNotFound(usize),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to persist {path}: {reason}")]
    Persist { path: PathBuf, reason: String },

    #[error("syllabus parser unavailable: {0}")]
    ParserUnavailable(String),

    #[error("syllabus could not be parsed: {0}")]
    ParseFailed(String),

    #[error("scrape failed: {0}")]
    ScrapeFailed(String),

    #[error("PDF unreadable: {0}")]
    PdfUnreadable(String),

    #[error("mail delivery failed: {0}")]
    Delivery(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// External collaborator failures are recoverable by falling back to
    /// manual entry.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Error::ParserUnavailable(_)
                | Error::ParseFailed(_)
                | Error::ScrapeFailed(_)
                | Error::PdfUnreadable(_)
                | Error::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
