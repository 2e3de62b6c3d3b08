//! Request orchestration: extract, fan out, merge, report.
//!
//! One call to [`Pipeline::triage_archive`] walks a request through
//! `Received -> Extracted -> Analyzing -> Aggregated -> Reported`, or ends in
//! `Errored` when the archive itself is unusable. Per-file analyzer failures
//! never leave the per-file record.

use crate::core::triage::{
    Analyzer, FieldOutcome, FileReport, MetadataMap, RuleOutcome, TriageReport, TypeSniffResult,
};
use crate::error::{Result, TriageError};
use crate::rules::{RuleSet, ScanLimits};
use crate::timeout::{blocking_with_timeout, TimeoutConfig};
use crate::triage::config::TriageConfig;
use crate::triage::extract::{extract_archive, ExtractedFile};
use crate::triage::metadata;
use crate::triage::signatures;
use crate::triage::sniffers::ContentSniffer;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, debug_span, info, warn, Instrument};
use uuid::Uuid;

/// Lifecycle of one triage request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageState {
    Received,
    Extracted,
    Analyzing,
    Aggregated,
    Reported,
    Errored,
}

impl fmt::Display for TriageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriageState::Received => "received",
            TriageState::Extracted => "extracted",
            TriageState::Analyzing => "analyzing",
            TriageState::Aggregated => "aggregated",
            TriageState::Reported => "reported",
            TriageState::Errored => "errored",
        };
        f.write_str(s)
    }
}

impl TriageState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: TriageState) -> bool {
        use TriageState::*;
        matches!(
            (self, next),
            (Received, Extracted)
                | (Extracted, Analyzing)
                | (Analyzing, Aggregated)
                | (Aggregated, Reported)
                | (Received, Errored)
        )
    }
}

struct RequestState {
    current: TriageState,
}

impl RequestState {
    fn new() -> Self {
        debug!(state = %TriageState::Received, "request state");
        Self {
            current: TriageState::Received,
        }
    }

    fn advance(&mut self, next: TriageState) {
        debug_assert!(
            self.current.can_transition_to(next),
            "illegal transition {} -> {}",
            self.current,
            next
        );
        debug!(from = %self.current, to = %next, "request state");
        self.current = next;
    }
}

/// Shared, immutable pipeline: configuration plus the compiled rule set.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<TriageConfig>,
    rules: Arc<RuleSet>,
}

impl Pipeline {
    pub fn new(config: Arc<TriageConfig>, rules: Arc<RuleSet>) -> Self {
        Self { config, rules }
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    fn scan_limits(&self) -> ScanLimits {
        ScanLimits {
            max_scan_bytes: self.config.analysis.max_scan_bytes,
            max_matches_per_string: self.config.analysis.max_matches_per_string,
        }
    }

    /// Triage one archive and return the complete report.
    ///
    /// Extraction happens in a fresh directory under the configured
    /// extraction root; the directory is removed when this future completes
    /// or is dropped.
    pub async fn triage_archive(&self, archive: &Path) -> Result<TriageReport> {
        let request_id = Uuid::new_v4();
        let span = crate::span_trace!("triage", %request_id);
        self.run(archive.to_path_buf()).instrument(span).await
    }

    async fn run(&self, archive: PathBuf) -> Result<TriageReport> {
        let mut state = RequestState::new();

        let (scratch, files) = match self.extract(archive).await {
            Ok(v) => v,
            Err(e) => {
                state.advance(TriageState::Errored);
                warn!(error = %e, "archive rejected");
                return Err(e);
            }
        };
        state.advance(TriageState::Extracted);
        info!(files = files.len(), "archive extracted");

        state.advance(TriageState::Analyzing);
        let workers = self.config.analysis.workers.max(1);
        let reports: Vec<FileReport> = stream::iter(files)
            .map(|file| self.analyze_file(file))
            .buffered(workers)
            .try_collect()
            .await?;

        state.advance(TriageState::Aggregated);
        let report = TriageReport::new(reports);

        if let Err(e) = scratch.close() {
            warn!(error = %e, "failed to remove extraction directory");
        }
        state.advance(TriageState::Reported);
        info!(files = report.len(), "triage complete");
        Ok(report)
    }

    async fn extract(&self, archive: PathBuf) -> Result<(TempDir, Vec<ExtractedFile>)> {
        let root = self.config.storage.extract_dir.clone();
        let limits = self.config.extraction.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root).map_err(|e| TriageError::io_at(&root, e))?;
            let scratch = tempfile::Builder::new()
                .prefix("extract-")
                .tempdir_in(&root)
                .map_err(|e| TriageError::io_at(&root, e))?;
            let files = extract_archive(&archive, scratch.path(), &limits)?;
            Ok((scratch, files))
        })
        .await?
    }

    /// Run all four analyzers over one file and merge their outcomes.
    ///
    /// Type sniffing and metadata run in sequence; signatures and rules run
    /// alongside them. Each analyzer is bounded by the configured timeout.
    pub async fn analyze_file(&self, file: ExtractedFile) -> Result<FileReport> {
        let span = debug_span!("file", path = %file.relative_path.display());
        self.analyze(file).instrument(span).await
    }

    async fn analyze(&self, file: ExtractedFile) -> Result<FileReport> {
        let millis = self.config.analysis.analyzer_timeout_ms;
        let rule_millis = self.config.analysis.rule_timeout_ms();
        let prefix = self.config.analysis.sniff_prefix_bytes;
        let limits = self.scan_limits();

        let type_and_metadata = {
            let path = file.path.clone();
            async move {
                let sniff_path = path.clone();
                let sniffed = blocking_with_timeout(
                    TimeoutConfig::new(millis, Analyzer::TypeSniffer.to_string()),
                    move || ContentSniffer::sniff_path(&sniff_path, prefix),
                )
                .await;
                let gate = sniffed.as_ref().cloned().unwrap_or_else(|_| TypeSniffResult::unknown());
                let metadata = if gate.is_image() {
                    blocking_with_timeout(
                        TimeoutConfig::new(millis, Analyzer::MetadataExtractor.to_string()),
                        move || metadata::extract(&path, &gate),
                    )
                    .await
                } else {
                    Ok(MetadataMap::new())
                };
                (sniffed, metadata)
            }
        };

        let signature_scan = {
            let path = file.path.clone();
            blocking_with_timeout(
                TimeoutConfig::new(millis, Analyzer::SignatureScanner.to_string()),
                move || signatures::scan_path(&path),
            )
        };

        let rule_scan = {
            let path = file.path.clone();
            let rules = Arc::clone(&self.rules);
            blocking_with_timeout(
                TimeoutConfig::new(rule_millis, Analyzer::RuleEngine.to_string()),
                move || rules.scan_path(&path, &limits),
            )
        };

        let ((sniffed, metadata), signatures, rules) =
            tokio::join!(type_and_metadata, signature_scan, rule_scan);
        let relative = relative_display(&file);

        let report = FileReport::builder()
            .with_file_name(file.file_name())
            .with_size_bytes(file.size_bytes)
            .with_file_type(FieldOutcome::from_result(
                Analyzer::TypeSniffer,
                scratch_free(sniffed, &relative),
            ))
            .with_signatures(FieldOutcome::from_result(
                Analyzer::SignatureScanner,
                scratch_free(signatures, &relative),
            ))
            .with_metadata(FieldOutcome::from_result(
                Analyzer::MetadataExtractor,
                scratch_free(metadata, &relative),
            ))
            .with_rules(RuleOutcome::from_result(scratch_free(rules, &relative)))
            .with_relative_path(relative)
            .build()
            .map_err(TriageError::Internal)?;

        for error in report.errors() {
            warn!(analyzer = %error.analyzer, kind = %error.kind, "analyzer degraded: {}", error);
        }
        Ok(report)
    }
}

/// Rewrite an analyzer I/O error to name the archive path rather than the
/// per-request scratch location.
fn scratch_free<T>(result: Result<T>, relative: &str) -> Result<T> {
    result.map_err(|e| match e {
        TriageError::IoAt { source, .. } => TriageError::IoAt {
            path: PathBuf::from(relative),
            source,
        },
        other => other,
    })
}

/// `/`-separated relative path, independent of the host separator.
fn relative_display(file: &ExtractedFile) -> String {
    file.relative_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
