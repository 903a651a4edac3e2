//! Command-line argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use hostenroll::KeyAlgorithm;

use crate::output::OutputFormat;

/// Enroll this host for a client certificate
///
/// Uses a bootstrap profile to reach the CA service, submits a certificate
/// signing request for a locally generated key, waits for an approver and
/// writes an identity config with the issued certificate.
#[derive(Parser, Debug)]
#[command(name = "hostenroll")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// CLI config file (defaults to the per-user config directory)
    #[arg(long, env = "HOSTENROLL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Obtain a client certificate and write the identity config
    Enroll(EnrollArgs),

    /// Show the state of this host's enrollment request
    Status(StatusArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),
}

// ============================================================================
// Shared arguments
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Bootstrap profile used to reach the CA service
    #[arg(short = 'b', long, env = "HOSTENROLL_BOOTSTRAP_PROFILE")]
    pub bootstrap_profile: Option<PathBuf>,

    /// Host identifier (defaults to the system hostname)
    #[arg(long, env = "HOSTENROLL_HOSTNAME")]
    pub hostname: Option<String>,
}

// ============================================================================
// Enroll command
// ============================================================================

#[derive(Args, Debug)]
pub struct EnrollArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Directory for the host's private key
    #[arg(long, env = "HOSTENROLL_KEY_DIR")]
    pub key_dir: Option<PathBuf>,

    /// Where to write the identity config
    #[arg(long, env = "HOSTENROLL_IDENTITY_PATH")]
    pub identity_path: Option<PathBuf>,

    /// Seconds to wait for approval before giving up
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Extra waiting rounds after the timeout, reusing the same request
    #[arg(long, value_name = "N")]
    pub resume: Option<u32>,

    /// Algorithm for a newly generated key
    #[arg(long, value_parser = parse_algorithm)]
    pub algorithm: Option<KeyAlgorithm>,

    /// Enroll even if an identity config already exists
    #[arg(short, long)]
    pub force: bool,
}

fn parse_algorithm(s: &str) -> Result<KeyAlgorithm, String> {
    s.parse()
}

// ============================================================================
// Status command
// ============================================================================

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Key to set (e.g., bootstrap_profile, key_dir)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,
}
