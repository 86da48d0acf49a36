//! Core data models for the chunked upload service.
//!
//! These types describe how chunks are named, which chunks a caller expects
//! to be assembled, and what an assembly produced. They serialize naturally
//! as JSON via `serde`.

pub mod assembly;
pub mod chunk;
pub mod manifest;
