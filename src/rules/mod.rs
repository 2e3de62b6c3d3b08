//! Compiled rule engine.
//!
//! Rule source is compiled once per process into a read-only [`RuleSet`]
//! that requests share through an `Arc`. Evaluation reports the names of
//! matching public rules, or `None` when nothing matched.
//!
//! The supported language is a subset of YARA: `rule` blocks with
//! `private`/`global` modifiers, tags, `meta:`, text/hex/regex `strings:` and
//! boolean `condition:` expressions over string matches, counts, offsets,
//! `filesize`, integer reads and earlier rules. Module imports are rejected.

mod compiler;
mod eval;
mod lexer;
mod parser;

pub use parser::MetaValue;

use crate::error::{Result, TriageError};
use memmap2::MmapOptions;
use once_cell::sync::OnceCell;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

static GLOBAL_RULES: OnceCell<Arc<RuleSet>> = OnceCell::new();

/// Bounds applied to one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Bytes of the input that are matched against; reads past this are undefined.
    pub max_scan_bytes: u64,
    /// Matches a single string may produce before evaluation fails.
    pub max_matches_per_string: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_scan_bytes: 64 * 1024 * 1024,
            max_matches_per_string: 100_000,
        }
    }
}

/// Read-only view of one compiled rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleInfo<'a> {
    pub name: &'a str,
    pub tags: &'a [String],
    pub meta: &'a [(String, MetaValue)],
    pub private: bool,
    pub global: bool,
}

/// A compiled, immutable rule set.
pub struct RuleSet {
    compiled: compiler::Compiled,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.compiled.rules.len())
            .field("strings", &self.compiled.strings.len())
            .finish()
    }
}

impl RuleSet {
    /// Compile rule source text.
    pub fn compile(source: &str) -> Result<Self> {
        Ok(Self {
            compiled: compiler::compile(source)?,
        })
    }

    /// Read and compile a rule file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| TriageError::io_at(path, e))?;
        let set = Self::compile(&source)?;
        info!(path = %path.display(), rules = set.len(), "rule set compiled");
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.compiled.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = RuleInfo<'_>> {
        self.compiled.rules.iter().map(|r| RuleInfo {
            name: &r.name,
            tags: &r.tags,
            meta: &r.meta,
            private: r.private,
            global: r.global,
        })
    }

    /// Evaluate against an in-memory buffer.
    pub fn scan_bytes(&self, data: &[u8], limits: &ScanLimits) -> Result<Option<Vec<String>>> {
        let window = usize::try_from(limits.max_scan_bytes).unwrap_or(usize::MAX);
        let scanned = &data[..data.len().min(window)];
        let names = eval::evaluate(
            &self.compiled,
            scanned,
            data.len() as u64,
            limits.max_matches_per_string,
        )?;
        Ok(if names.is_empty() { None } else { Some(names) })
    }

    /// Evaluate against a file, memory-mapping at most `max_scan_bytes`.
    pub fn scan_path(&self, path: &Path, limits: &ScanLimits) -> Result<Option<Vec<String>>> {
        let file = File::open(path).map_err(|e| TriageError::io_at(path, e))?;
        let filesize = file
            .metadata()
            .map_err(|e| TriageError::io_at(path, e))?
            .len();
        let window = filesize.min(limits.max_scan_bytes);

        let names = if window == 0 {
            eval::evaluate(&self.compiled, &[], filesize, limits.max_matches_per_string)?
        } else {
            let len = usize::try_from(window)
                .map_err(|_| TriageError::RuleEvaluation("scan window exceeds address space".into()))?;
            // Safety: read-only private mapping of a scratch file owned by this request.
            let map = unsafe { MmapOptions::new().len(len).map(&file) }
                .map_err(|e| TriageError::RuleEvaluation(format!("cannot map input: {}", e)))?;
            eval::evaluate(&self.compiled, &map, filesize, limits.max_matches_per_string)?
        };
        debug!(path = %path.display(), matched = names.len(), "rules evaluated");
        Ok(if names.is_empty() { None } else { Some(names) })
    }
}

/// Compile `path` on first use and return the shared instance afterwards.
pub fn load_global(path: &Path) -> Result<Arc<RuleSet>> {
    GLOBAL_RULES
        .get_or_try_init(|| RuleSet::load(path).map(Arc::new))
        .cloned()
}
