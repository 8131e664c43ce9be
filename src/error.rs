//! Error types for report loading and export.
//!
//! None of the report errors reach the dashboard: the loader turns them into
//! the empty snapshot. They are kept distinct so the log says why.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to obtain any records from a report document.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The results directory or the report file does not exist.
    #[error("report not found: {}", .0.display())]
    SourceMissing(PathBuf),

    /// The report file exists but has zero bytes.
    #[error("report is empty: {}", .0.display())]
    SourceEmpty(PathBuf),

    /// The document is not well-formed markup.
    #[error("malformed report {}: {reason}", .path.display())]
    ParseMalformed { path: PathBuf, reason: String },

    /// The report could not be read.
    #[error("failed to read report {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReportError {
    /// Missing and empty sources are the ordinary "no data yet" state.
    pub fn is_expected(&self) -> bool {
        matches!(self, ReportError::SourceMissing(_) | ReportError::SourceEmpty(_))
    }
}

/// Reason a single test element was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("missing status element")]
    MissingStatus,

    #[error("missing {0} attribute")]
    MissingTimestamp(&'static str),

    #[error("unparseable timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("end time precedes start time")]
    NegativeDuration,
}

/// Failure to write an export file.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The target is held open by another program.
    #[error("{} is open in another program; close the report before exporting again", .0.display())]
    Blocked(PathBuf),

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
}
