//! SIGNAL FLUX: live client and run comparison for a signal-analysis job server
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod protocol;
pub mod reconciler;
pub mod connection;
pub mod engine;
pub mod comparison;
pub mod api;
