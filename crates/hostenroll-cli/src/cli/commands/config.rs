//! `hostenroll config` - CLI configuration management.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};
use crate::config::Config;

pub fn execute(ctx: Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(&ctx),
        ConfigCommands::Set { key, value } => set_config(&ctx, &key, &value),
        ConfigCommands::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    if ctx.output_format.print_structured(config)? {
        return Ok(());
    }

    let unset = || "(not set)".dimmed().to_string();
    let path = |p: &Option<std::path::PathBuf>| {
        p.as_ref().map_or_else(unset, |p| p.display().to_string())
    };

    println!("{}", "Current Configuration:".bold());
    println!();
    println!("  {} {}", "bootstrap_profile:".bold(), path(&config.bootstrap_profile));
    println!(
        "  {} {}",
        "key_dir:".bold(),
        config
            .key_dir_or_default()
            .map_or_else(|_| unset(), |p| p.display().to_string())
    );
    println!(
        "  {} {}",
        "identity_path:".bold(),
        config
            .identity_path_or_default()
            .map_or_else(|_| unset(), |p| p.display().to_string())
    );
    println!(
        "  {} {}",
        "approval_timeout_secs:".bold(),
        config
            .approval_timeout_secs
            .map_or_else(unset, |s| s.to_string())
    );
    println!(
        "  {} {}",
        "resume_attempts:".bold(),
        config.resume_attempts.unwrap_or(0)
    );
    println!(
        "  {} {}",
        "algorithm:".bold(),
        config.algorithm.unwrap_or_default()
    );
    println!(
        "  {} {}",
        "output_format:".bold(),
        config.output_format.unwrap_or_default()
    );

    Ok(())
}

fn set_config(ctx: &Context, key: &str, value: &str) -> Result<()> {
    let mut config: Config = ctx.config.clone();
    config.set(key, value)?;
    config.save_to(&ctx.config_path)?;

    println!(
        "{} {} set to {}.",
        "Success:".green().bold(),
        key,
        value.cyan()
    );
    Ok(())
}
