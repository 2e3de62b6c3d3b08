//! File and request level report types.
//!
//! A [`FileReport`] keeps the typed per-analyzer outcomes. Serialization
//! flattens them into the fixed wire shape (`file_name`, `file_extension`,
//! `file_mime_type`, `embedded_files`, `exif_data`, `matched_yara_rules`),
//! appending an `errors` array only when some analyzer failed.

use super::errors::{Analyzer, AnalyzerError};
use super::outcome::{FieldOutcome, MetadataMap, RuleOutcome, TypeSniffResult};
use crate::error::{Result, TriageError};
use serde::ser::{Serialize, Serializer};
use serde::Serialize as DeriveSerialize;

/// Merged analyzer results for one extracted file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    /// Base name of the extracted file
    pub file_name: String,
    /// Path relative to the extraction root, `/`-separated
    pub relative_path: String,
    pub size_bytes: u64,
    pub file_type: FieldOutcome<TypeSniffResult>,
    pub signatures: FieldOutcome<Vec<String>>,
    pub metadata: FieldOutcome<MetadataMap>,
    pub rules: RuleOutcome,
}

#[derive(DeriveSerialize)]
struct WireFileReport<'a> {
    file_name: &'a str,
    file_extension: Option<&'a str>,
    file_mime_type: Option<&'a str>,
    embedded_files: &'a [String],
    exif_data: &'a MetadataMap,
    matched_yara_rules: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<&'a AnalyzerError>,
}

impl FileReport {
    pub fn builder() -> FileReportBuilder {
        FileReportBuilder::default()
    }

    pub fn file_extension(&self) -> Option<&str> {
        self.file_type.value().and_then(|t| t.extension.as_deref())
    }

    pub fn file_mime_type(&self) -> Option<&str> {
        self.file_type.value().and_then(|t| t.mime.as_deref())
    }

    /// Signature labels; empty when the scanner matched nothing or failed.
    pub fn embedded_files(&self) -> &[String] {
        self.signatures.value().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Metadata tags; empty when absent or failed.
    pub fn exif_data(&self) -> &MetadataMap {
        static EMPTY: MetadataMap = MetadataMap::new();
        self.metadata.value().unwrap_or(&EMPTY)
    }

    pub fn matched_rules(&self) -> Option<&[String]> {
        self.rules.matched()
    }

    /// Every analyzer failure recorded for this file, in analyzer order.
    pub fn errors(&self) -> Vec<&AnalyzerError> {
        [
            self.file_type.error(),
            self.signatures.error(),
            self.metadata.error(),
            self.rules.error(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn error_for(&self, analyzer: Analyzer) -> Option<&AnalyzerError> {
        self.errors().into_iter().find(|e| e.analyzer == analyzer)
    }

    fn wire(&self) -> WireFileReport<'_> {
        WireFileReport {
            file_name: &self.file_name,
            file_extension: self.file_extension(),
            file_mime_type: self.file_mime_type(),
            embedded_files: self.embedded_files(),
            exif_data: self.exif_data(),
            matched_yara_rules: self.matched_rules(),
            errors: self.errors(),
        }
    }
}

impl Serialize for FileReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.wire().serialize(serializer)
    }
}

/// Builder for [`FileReport`]. Name and all four outcomes are required.
#[derive(Debug, Default)]
pub struct FileReportBuilder {
    file_name: Option<String>,
    relative_path: Option<String>,
    size_bytes: u64,
    file_type: Option<FieldOutcome<TypeSniffResult>>,
    signatures: Option<FieldOutcome<Vec<String>>>,
    metadata: Option<FieldOutcome<MetadataMap>>,
    rules: Option<RuleOutcome>,
}

impl FileReportBuilder {
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_relative_path(mut self, path: impl Into<String>) -> Self {
        self.relative_path = Some(path.into());
        self
    }

    pub fn with_size_bytes(mut self, size: u64) -> Self {
        self.size_bytes = size;
        self
    }

    pub fn with_file_type(mut self, outcome: FieldOutcome<TypeSniffResult>) -> Self {
        self.file_type = Some(outcome);
        self
    }

    pub fn with_signatures(mut self, outcome: FieldOutcome<Vec<String>>) -> Self {
        self.signatures = Some(outcome);
        self
    }

    pub fn with_metadata(mut self, outcome: FieldOutcome<MetadataMap>) -> Self {
        self.metadata = Some(outcome);
        self
    }

    pub fn with_rules(mut self, outcome: RuleOutcome) -> Self {
        self.rules = Some(outcome);
        self
    }

    pub fn build(self) -> std::result::Result<FileReport, String> {
        let file_name = self.file_name.ok_or("file_name is required")?;
        Ok(FileReport {
            relative_path: self.relative_path.unwrap_or_else(|| file_name.clone()),
            file_name,
            size_bytes: self.size_bytes,
            file_type: self.file_type.ok_or("file_type outcome is required")?,
            signatures: self.signatures.ok_or("signatures outcome is required")?,
            metadata: self.metadata.ok_or("metadata outcome is required")?,
            rules: self.rules.ok_or("rules outcome is required")?,
        })
    }
}

/// Ordered report for one upload, one entry per extracted file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriageReport {
    pub files: Vec<FileReport>,
}

impl Serialize for TriageReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.files.serialize(serializer)
    }
}

impl TriageReport {
    pub fn new(files: Vec<FileReport>) -> Self {
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| TriageError::Internal(format!("JSON serialization error: {}", e)))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TriageError::Internal(format!("JSON serialization error: {}", e)))
    }
}
