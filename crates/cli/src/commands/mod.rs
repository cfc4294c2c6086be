//! Subcommand implementations

pub mod engine;
pub mod ingest;
pub mod predictions;
