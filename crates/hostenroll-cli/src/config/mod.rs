//! Configuration management.

use anyhow::{Context as _, Result};
use directories::{BaseDirs, ProjectDirs};
use hostenroll::{EnrollError, KeyAlgorithm};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Bootstrap profile used to reach the CA service.
    pub bootstrap_profile: Option<PathBuf>,

    /// Directory for host private keys.
    pub key_dir: Option<PathBuf>,

    /// Where the identity config is written.
    pub identity_path: Option<PathBuf>,

    /// Seconds to wait for approval.
    pub approval_timeout_secs: Option<u64>,

    /// Extra waiting rounds after a timeout.
    pub resume_attempts: Option<u32>,

    /// Algorithm for newly generated keys.
    pub algorithm: Option<KeyAlgorithm>,

    /// Default output format.
    pub output_format: Option<OutputFormat>,
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("io", "hostenroll", "hostenroll")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Load configuration from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            EnrollError::Config(format!("invalid CLI config {}: {e}", path.display()))
        })?;

        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Set a key by name from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = |what: &str| EnrollError::Config(format!("invalid {what}: {value:?}"));

        match key {
            "bootstrap_profile" | "bootstrap-profile" => {
                self.bootstrap_profile = Some(value.into());
            }
            "key_dir" | "key-dir" => self.key_dir = Some(value.into()),
            "identity_path" | "identity-path" => self.identity_path = Some(value.into()),
            "approval_timeout_secs" | "timeout" => {
                self.approval_timeout_secs =
                    Some(value.parse().map_err(|_| invalid("timeout"))?);
            }
            "resume_attempts" | "resume" => {
                self.resume_attempts = Some(value.parse().map_err(|_| invalid("resume count"))?);
            }
            "algorithm" => {
                self.algorithm = Some(value.parse().map_err(EnrollError::Config)?);
            }
            "output_format" | "output" => self.output_format = Some(value.parse()?),
            _ => {
                return Err(EnrollError::Config(format!(
                    "Unknown config key: {key}\n\n\
                     Available keys:\n  \
                     bootstrap_profile     - Bootstrap profile path\n  \
                     key_dir               - Directory for host keys\n  \
                     identity_path         - Identity config output path\n  \
                     approval_timeout_secs - Seconds to wait for approval\n  \
                     resume_attempts       - Extra waiting rounds after a timeout\n  \
                     algorithm             - Key algorithm (ecdsa-p256/ecdsa-p384/ed25519)\n  \
                     output_format         - Default output format (pretty/json/yaml)"
                ))
                .into())
            }
        }

        Ok(())
    }

    /// Key directory, falling back to the per-user state directory.
    pub fn key_dir_or_default(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.key_dir {
            return Ok(dir.clone());
        }
        let dirs = project_dirs()?;
        Ok(dirs
            .state_dir()
            .unwrap_or_else(|| dirs.data_local_dir())
            .join("keys"))
    }

    /// Identity config path, falling back to `~/.hostenroll/config`.
    pub fn identity_path_or_default(&self) -> Result<PathBuf> {
        if let Some(path) = &self.identity_path {
            return Ok(path.clone());
        }
        let base = BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        Ok(base.home_dir().join(".hostenroll").join("config"))
    }
}
