//! Command implementations.

pub mod config;
pub mod enroll;
pub mod status;

use std::path::PathBuf;

use hostenroll::{load_bootstrap, BootstrapProfile, EnrollError};

use super::args::TargetArgs;
use crate::config::Config;
use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded CLI configuration
    pub config: Config,

    /// Where the configuration lives
    pub config_path: PathBuf,

    /// Output format
    pub output_format: OutputFormat,
}

impl Context {
    /// Host identifier from the flags, or the system hostname.
    pub fn host(&self, target: &TargetArgs) -> anyhow::Result<String> {
        if let Some(host) = &target.hostname {
            return Ok(host.clone());
        }

        let name = hostname::get()
            .map_err(|e| EnrollError::Config(format!("cannot read system hostname: {e}")))?;
        name.into_string().map_err(|raw| {
            EnrollError::Config(format!("system hostname {raw:?} is not valid UTF-8")).into()
        })
    }

    /// Load the bootstrap profile named by the flags or the config.
    pub fn bootstrap_profile(&self, target: &TargetArgs) -> anyhow::Result<BootstrapProfile> {
        let path = target
            .bootstrap_profile
            .clone()
            .or_else(|| self.config.bootstrap_profile.clone())
            .ok_or_else(|| {
                EnrollError::Config(
                    "bootstrap profile required.\n\n\
                     Set it with one of:\n  \
                     1. --bootstrap-profile <FILE>\n  \
                     2. HOSTENROLL_BOOTSTRAP_PROFILE environment variable\n  \
                     3. hostenroll config set bootstrap_profile <FILE>"
                        .into(),
                )
            })?;

        Ok(load_bootstrap(&path)?)
    }
}
