//! Error types for the triagebox pipeline.
//!
//! Fatal errors abort a whole request (or process startup, for rule
//! compilation). Per-file analyzer failures never surface through this type
//! at the report level; they are folded into
//! [`AnalyzerError`](crate::core::triage::AnalyzerError) values on the
//! affected file instead.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for triagebox operations.
#[derive(Debug, Error)]
pub enum TriageError {
    /// The upload could not be opened as an archive at all.
    #[error("Cannot open archive: {0}")]
    ArchiveOpen(String),

    /// An entry would resolve outside the extraction root.
    #[error("Archive entry escapes extraction root: {entry}")]
    PathTraversal { entry: String },

    /// One member of an otherwise readable archive cannot be expanded:
    /// corrupt data, a failed checksum, or a path that collides with an
    /// earlier entry.
    #[error("Cannot extract archive entry {entry}: {reason}")]
    ArchiveEntry { entry: String, reason: String },

    /// Extraction limits exceeded (entry count or expanded bytes).
    #[error("Archive exceeds limit: {resource} ({used}/{limit})")]
    ArchiveTooLarge {
        resource: &'static str,
        used: u64,
        limit: u64,
    },

    /// Image decoder could not parse a positively sniffed image.
    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    /// Rule evaluation failed for one input.
    #[error("Rule evaluation failed: {0}")]
    RuleEvaluation(String),

    /// Rule source is malformed.
    #[error("Rule compilation failed at line {line}: {message}")]
    RuleCompilation { line: usize, message: String },

    /// Analyzer or operation timeout
    #[error("Operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upload request is missing data
    #[error("{0}")]
    BadRequest(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a path
    #[error("I/O error on {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Background task failed to join
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for triagebox operations
pub type Result<T> = std::result::Result<T, TriageError>;

impl TriageError {
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TriageError::IoAt {
            path: path.into(),
            source,
        }
    }

    pub fn archive_entry(entry: impl Into<String>, reason: impl ToString) -> Self {
        TriageError::ArchiveEntry {
            entry: entry.into(),
            reason: reason.to_string(),
        }
    }

    pub fn rule_compilation(line: usize, message: impl Into<String>) -> Self {
        TriageError::RuleCompilation {
            line,
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole request rather than a single field.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TriageError::ArchiveOpen(_)
                | TriageError::ArchiveEntry { .. }
                | TriageError::PathTraversal { .. }
                | TriageError::ArchiveTooLarge { .. }
                | TriageError::RuleCompilation { .. }
                | TriageError::BadRequest(_)
                | TriageError::Config(_)
        )
    }
}

impl From<zip::result::ZipError> for TriageError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => TriageError::Io(e),
            other => TriageError::ArchiveOpen(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for TriageError {
    fn from(err: tokio::task::JoinError) -> Self {
        TriageError::Internal(err.to_string())
    }
}
