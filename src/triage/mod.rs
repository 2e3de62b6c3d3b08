//! Triage runtime: archive expansion, per-file analyzers and orchestration.
//!
//! Every extracted file goes through the same four analyzers, and the
//! orchestrator in [`api`] folds their outcomes into one report entry.

pub mod api;
pub mod config;
pub mod extract;
pub mod io;
pub mod metadata;
pub mod signatures;
pub mod sniffers;

pub use crate::core::triage::{
    Analyzer, AnalyzerError, ErrorKind, FieldOutcome, FileReport, MetadataMap, MetadataValue,
    RuleOutcome, TriageReport, TypeSniffResult,
};
pub use api::{Pipeline, TriageState};
pub use config::TriageConfig;
pub use extract::{extract_archive, ExtractedFile};
pub use sniffers::ContentSniffer;
