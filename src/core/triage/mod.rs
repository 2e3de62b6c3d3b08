//! Core triage data types organized by submodule.

pub mod errors;
pub mod outcome;
pub mod report;

// Re-exports for convenient access under crate::core::triage::*
pub use errors::{Analyzer, AnalyzerError, ErrorKind};
pub use outcome::{FieldOutcome, MetadataMap, MetadataValue, RuleOutcome, TypeSniffResult};
pub use report::{FileReport, FileReportBuilder, TriageReport};
