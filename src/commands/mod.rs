//! Command implementations for the CLI
//!
//! - start: run the HTTP server
//! - init: create the schema on the configured backend
//! - import: load a JSON batch of observations
//! - config: configuration display and validation

pub mod config;
pub mod import;
pub mod init;
pub mod start;
