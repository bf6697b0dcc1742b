//! CLI argument definitions for quayside-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Quayside container orchestration daemon.
///
/// Reconciles declarative container configurations against the local
/// container engine and enforces the image digest allowlist.
#[derive(Parser, Debug)]
#[command(name = "quayside-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to quayside.toml configuration file.
    #[arg(short, long, default_value = "/etc/quayside/quayside.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the container engine endpoint.
    #[arg(long)]
    pub engine_host: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}
