//! Configuration for the triage pipeline.
//!
//! Centralized configuration for all components with sensible defaults.
//! A TOML file may set any subset of fields; omitted sections and fields
//! keep their defaults.

use crate::error::{Result, TriageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Master configuration for the triage service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// HTTP listener configuration.
    pub server: ServerConfig,
    /// Scratch storage roots.
    pub storage: StorageConfig,
    /// Archive expansion limits.
    pub extraction: ExtractionConfig,
    /// Per-file analysis scheduling and bounds.
    pub analysis: AnalysisConfig,
    /// Rule set source.
    pub rules: RulesConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind (default: 127.0.0.1:5000).
    pub bind: String,
    /// Maximum accepted request body in bytes (default: 256MB).
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            max_upload_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Scratch storage roots. Both are created if absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where received archives are persisted (default: ./uploads).
    pub upload_dir: PathBuf,
    /// Parent of the per-request extraction directories (default: ./extracted_files).
    pub extract_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./uploads"),
            extract_dir: PathBuf::from("./extracted_files"),
        }
    }
}

/// Archive expansion limits guarding against decompression bombs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Maximum number of archive entries, directories included (default: 10000).
    pub max_entries: u64,
    /// Maximum total expanded bytes across all files (default: 1GB).
    pub max_total_bytes: u64,
    /// Maximum expanded bytes for a single file (default: 256MB).
    pub max_file_bytes: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_total_bytes: 1024 * 1024 * 1024,
            max_file_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Per-file analysis scheduling and bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Files analyzed concurrently (default: available parallelism).
    pub workers: usize,
    /// Deadline for each analyzer invocation in milliseconds (default: 10000).
    pub analyzer_timeout_ms: u64,
    /// Separate deadline for the rule engine; unset means `analyzer_timeout_ms`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_timeout_ms: Option<u64>,
    /// Prefix read by the type sniffer (default: 8192).
    pub sniff_prefix_bytes: u64,
    /// Maximum bytes of a file the rule engine scans (default: 64MB).
    pub max_scan_bytes: u64,
    /// Per-string match budget before rule evaluation fails (default: 100000).
    pub max_matches_per_string: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            analyzer_timeout_ms: crate::timeout::DEFAULT_ANALYZER_TIMEOUT_MS,
            rule_timeout_ms: None,
            sniff_prefix_bytes: crate::triage::io::MAX_SNIFF_SIZE,
            max_scan_bytes: 64 * 1024 * 1024,
            max_matches_per_string: 100_000,
        }
    }
}

impl AnalysisConfig {
    /// Effective rule engine deadline in milliseconds.
    pub fn rule_timeout_ms(&self) -> u64 {
        self.rule_timeout_ms.unwrap_or(self.analyzer_timeout_ms)
    }
}

/// Rule set source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Rule definition file read once at startup (default: ./rules.yar).
    pub path: PathBuf,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./rules.yar"),
        }
    }
}

impl TriageConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: TriageConfig =
            toml::from_str(text).map_err(|e| TriageError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from {:?}", path);
        let text = std::fs::read_to_string(path).map_err(|e| TriageError::io_at(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| TriageError::Config(e.to_string()))
    }

    /// Reject limits that would make the pipeline unusable.
    pub fn validate(&self) -> Result<()> {
        let zero = |name: &str| Err(TriageError::Config(format!("{} must be greater than zero", name)));
        if self.extraction.max_entries == 0 {
            return zero("extraction.max_entries");
        }
        if self.extraction.max_total_bytes == 0 {
            return zero("extraction.max_total_bytes");
        }
        if self.extraction.max_file_bytes == 0 {
            return zero("extraction.max_file_bytes");
        }
        if self.analysis.workers == 0 {
            return zero("analysis.workers");
        }
        if self.analysis.analyzer_timeout_ms == 0 {
            return zero("analysis.analyzer_timeout_ms");
        }
        if self.analysis.rule_timeout_ms == Some(0) {
            return zero("analysis.rule_timeout_ms");
        }
        if self.analysis.sniff_prefix_bytes == 0 {
            return zero("analysis.sniff_prefix_bytes");
        }
        if self.analysis.max_scan_bytes == 0 {
            return zero("analysis.max_scan_bytes");
        }
        if self.server.max_upload_bytes == 0 {
            return zero("server.max_upload_bytes");
        }
        Ok(())
    }

    /// Create the scratch roots if they do not exist.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.storage.upload_dir, &self.storage.extract_dir] {
            std::fs::create_dir_all(dir).map_err(|e| TriageError::io_at(dir, e))?;
            debug!("Scratch directory ready: {:?}", dir);
        }
        Ok(())
    }
}
