//! Quayside daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `quayside-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod logging;
pub mod metrics_server;
