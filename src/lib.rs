//! triagebox: forensic triage of uploaded archives.
//!
//! An archive is expanded into a private scratch directory and every
//! contained file is run through four analyzers (content type sniffing,
//! magic-signature scanning, image metadata extraction and rule matching).
//! The merged per-file results form a [`TriageReport`](core::triage::TriageReport).

/// Core data types
pub mod core;

/// Evidence imaging, hashing and host enumeration
pub mod collect;

/// Error types
pub mod error;

/// Logging and tracing setup
pub mod logging;

/// Rule language compiler and matcher
pub mod rules;

/// HTTP upload endpoint
pub mod server;

/// Deadlines for analyzer work
pub mod timeout;

/// Extraction, analyzers and orchestration
pub mod triage;

pub use error::{Result, TriageError};
