//! hostenroll - enroll this host for a client certificate

use std::process::ExitCode;

use colored::Colorize;

#[tokio::main]
async fn main() -> ExitCode {
    match hostenroll_cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            ExitCode::from(hostenroll_cli::exit_code(&e))
        }
    }
}
