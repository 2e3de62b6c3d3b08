//! Per-analyzer result types and the explicit present/absent outcome model.

use super::errors::{Analyzer, AnalyzerError};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content-derived type guess. Both fields are `None` together when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSniffResult {
    pub extension: Option<String>,
    pub mime: Option<String>,
}

impl TypeSniffResult {
    pub fn new(extension: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            extension: Some(extension.into()),
            mime: Some(mime.into()),
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        self.mime.is_none()
    }

    /// True when the MIME type belongs to the `image/*` family.
    pub fn is_image(&self) -> bool {
        self.mime
            .as_deref()
            .map(|m| m.starts_with("image/"))
            .unwrap_or(false)
    }
}

/// A normalized metadata tag value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    List(Vec<String>),
}

/// Tag name to normalized value, ordered by tag name.
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// Outcome of one analyzer for one file.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome<T> {
    Present(T),
    Absent(AnalyzerError),
}

impl<T> FieldOutcome<T> {
    pub fn from_result(analyzer: Analyzer, result: Result<T>) -> Self {
        match result {
            Ok(v) => FieldOutcome::Present(v),
            Err(e) => FieldOutcome::Absent(AnalyzerError::from_error(analyzer, &e)),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            FieldOutcome::Present(v) => Some(v),
            FieldOutcome::Absent(_) => None,
        }
    }

    pub fn error(&self) -> Option<&AnalyzerError> {
        match self {
            FieldOutcome::Present(_) => None,
            FieldOutcome::Absent(e) => Some(e),
        }
    }
}

/// Rule engine outcome. `NoMatch` and `NotEvaluated` are distinct states.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Matched(Vec<String>),
    NoMatch,
    NotEvaluated(AnalyzerError),
}

impl RuleOutcome {
    pub fn from_result(result: Result<Option<Vec<String>>>) -> Self {
        match result {
            Ok(Some(names)) if !names.is_empty() => RuleOutcome::Matched(names),
            Ok(_) => RuleOutcome::NoMatch,
            Err(e) => RuleOutcome::NotEvaluated(AnalyzerError::from_error(Analyzer::RuleEngine, &e)),
        }
    }

    /// Matched rule names, `None` when nothing matched or evaluation failed.
    pub fn matched(&self) -> Option<&[String]> {
        match self {
            RuleOutcome::Matched(names) => Some(names),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AnalyzerError> {
        match self {
            RuleOutcome::NotEvaluated(e) => Some(e),
            _ => None,
        }
    }
}
