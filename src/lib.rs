//! AUTOTRADER: unattended limit-order bot for a single crypto pair.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod exchange;
pub mod oracle;
pub mod output;
pub mod engine;
pub mod dashboard;
