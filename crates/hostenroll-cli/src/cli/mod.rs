//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use hostenroll::{EnrollError, ErrorKind};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::output::OutputFormat;

/// Exit code for errors a rerun may fix (EX_TEMPFAIL).
pub const EXIT_RETRYABLE: u8 = 75;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    // Load configuration
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load_from(&config_path)?;

    // Determine output format
    let output_format = cli
        .output
        .or(config.output_format)
        .unwrap_or(OutputFormat::Pretty);

    // Create context for commands
    let ctx = commands::Context {
        config,
        config_path,
        output_format,
    };

    // Dispatch to appropriate command
    match cli.command {
        Commands::Enroll(args) => commands::enroll::execute(ctx, args).await,
        Commands::Status(args) => commands::status::execute(ctx, args).await,
        Commands::Config(args) => commands::config::execute(ctx, args),
    }
}

/// Map an error to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let Some(enroll) = err.chain().find_map(|e| e.downcast_ref::<EnrollError>()) else {
        return 1;
    };

    match enroll.kind() {
        ErrorKind::Usage => 2,
        ErrorKind::Denied => 3,
        ErrorKind::Retryable => EXIT_RETRYABLE,
        ErrorKind::Fatal => 1,
    }
}

/// Log to stderr; `RUST_LOG` takes precedence over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init in the same process (tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}
