//! `hostenroll enroll` - obtain a client certificate for this host.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use hostenroll::{naming, BootstrapOptions, BootstrapOutcome, Bootstrapper};
use serde::Serialize;

use super::Context;
use crate::cli::args::EnrollArgs;

/// Result of an enroll run, as printed.
#[derive(Debug, Serialize)]
struct EnrollReport {
    status: &'static str,
    identity_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    not_after: Option<DateTime<Utc>>,
}

impl From<BootstrapOutcome> for EnrollReport {
    fn from(outcome: BootstrapOutcome) -> Self {
        match outcome {
            BootstrapOutcome::Enrolled {
                request,
                certificate,
                identity_path,
                key_path,
            } => Self {
                status: "enrolled",
                identity_path,
                request: Some(request.name),
                uid: Some(request.uid),
                key_path: Some(key_path),
                subject: Some(certificate.subject),
                not_after: Some(certificate.not_after),
            },
            BootstrapOutcome::AlreadyEnrolled { identity_path } => Self {
                status: "already-enrolled",
                identity_path,
                request: None,
                uid: None,
                key_path: None,
                subject: None,
                not_after: None,
            },
        }
    }
}

/// Build bootstrap options from flags, then config, then defaults.
fn options(ctx: &Context, args: &EnrollArgs, host: String) -> Result<BootstrapOptions> {
    let config = &ctx.config;
    let key_dir = match &args.key_dir {
        Some(dir) => dir.clone(),
        None => config.key_dir_or_default()?,
    };
    let identity_path = match &args.identity_path {
        Some(path) => path.clone(),
        None => config.identity_path_or_default()?,
    };

    let timeout = args
        .timeout
        .or(config.approval_timeout_secs)
        .map_or(naming::DEFAULT_APPROVAL_TIMEOUT, Duration::from_secs);

    Ok(BootstrapOptions::new(host, key_dir, identity_path)
        .algorithm(args.algorithm.or(config.algorithm).unwrap_or_default())
        .approval_timeout(timeout)
        .resume_attempts(args.resume.or(config.resume_attempts).unwrap_or(0))
        .force(args.force))
}

pub async fn execute(ctx: Context, args: EnrollArgs) -> Result<()> {
    let host = ctx.host(&args.target)?;
    let profile = ctx.bootstrap_profile(&args.target)?;
    let options = options(&ctx, &args, host)?;

    if ctx.output_format == crate::output::OutputFormat::Pretty {
        eprintln!(
            "{} {} via {}",
            "Enrolling".cyan().bold(),
            options.host.bold(),
            profile.endpoint
        );
    }

    let bootstrapper = Bootstrapper::from_profile(options, &profile)?;
    let outcome = bootstrapper
        .run(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    let report = EnrollReport::from(outcome);
    if ctx.output_format.print_structured(&report)? {
        return Ok(());
    }

    match report.status {
        "enrolled" => {
            println!("{} Host enrolled.", "Success:".green().bold());
            if let (Some(request), Some(uid)) = (&report.request, &report.uid) {
                println!("  {} {} ({})", "request:".bold(), request, uid.dimmed());
            }
            if let Some(subject) = &report.subject {
                println!("  {} {}", "subject:".bold(), subject);
            }
            if let Some(not_after) = &report.not_after {
                println!("  {} {}", "expires:".bold(), not_after.to_rfc3339());
            }
            if let Some(key_path) = &report.key_path {
                println!("  {} {}", "key:".bold(), key_path.display());
            }
            println!("  {} {}", "identity:".bold(), report.identity_path.display());
        }
        _ => {
            println!(
                "{} identity config already present at {} (use --force to re-enroll)",
                "Note:".yellow().bold(),
                report.identity_path.display()
            );
        }
    }

    Ok(())
}
