//! Core data types for triagebox.
//!
//! Plain data carried between the pipeline stages and serialized into the
//! report. Runtime behaviour lives under [`crate::triage`].

pub mod triage;
