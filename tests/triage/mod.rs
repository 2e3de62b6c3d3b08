//! Pipeline and HTTP integration tests.

mod adversarial;
mod determinism_json;
mod end_to_end;
mod http;
mod rules_file;
