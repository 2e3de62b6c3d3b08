//! Per-file analyzer error records.

use crate::error::TriageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four per-file analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Analyzer {
    TypeSniffer,
    SignatureScanner,
    MetadataExtractor,
    RuleEngine,
}

/// Standardized error kinds a single analyzer can report for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Io,
    UnsupportedImage,
    RuleEvaluation,
    Timeout,
    Other,
}

/// A failure recorded against one analyzer for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerError {
    pub analyzer: Analyzer,
    pub kind: ErrorKind,
    pub message: Option<String>,
}

impl fmt::Display for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Analyzer::TypeSniffer => write!(f, "type_sniffer"),
            Analyzer::SignatureScanner => write!(f, "signature_scanner"),
            Analyzer::MetadataExtractor => write!(f, "metadata_extractor"),
            Analyzer::RuleEngine => write!(f, "rule_engine"),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ErrorKind::*;
        match self {
            Io => write!(f, "Io"),
            UnsupportedImage => write!(f, "UnsupportedImage"),
            RuleEvaluation => write!(f, "RuleEvaluation"),
            Timeout => write!(f, "Timeout"),
            Other => write!(f, "Other"),
        }
    }
}

impl fmt::Display for AnalyzerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(m) => write!(f, "{} {}: {}", self.analyzer, self.kind, m),
            None => write!(f, "{} {}", self.analyzer, self.kind),
        }
    }
}

impl AnalyzerError {
    pub fn new(analyzer: Analyzer, kind: ErrorKind, message: Option<String>) -> Self {
        Self {
            analyzer,
            kind,
            message,
        }
    }

    /// Classify a crate error raised inside an analyzer.
    pub fn from_error(analyzer: Analyzer, err: &TriageError) -> Self {
        let kind = match err {
            TriageError::Io(_) | TriageError::IoAt { .. } => ErrorKind::Io,
            TriageError::UnsupportedImage(_) => ErrorKind::UnsupportedImage,
            TriageError::RuleEvaluation(_) => ErrorKind::RuleEvaluation,
            TriageError::Timeout { .. } => ErrorKind::Timeout,
            _ => ErrorKind::Other,
        };
        Self::new(analyzer, kind, Some(err.to_string()))
    }
}
