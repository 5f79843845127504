//! Configuration loader with multi-source merging

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::UkfaasConfig;

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    working_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader rooted at the current directory
    pub fn new() -> Self {
        Self {
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "UKFAAS".to_string(),
        }
    }

    /// Set the working directory configuration files are read from
    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "UKFAAS")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<UkfaasConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = UkfaasConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. Project config (ukfaas.toml)
        let project_file = self.working_dir.join("ukfaas.toml");
        if project_file.exists() {
            builder = builder.add_source(
                config::File::from(project_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 3. Local config (ukfaas.local.toml, gitignored)
        let local_file = self.working_dir.join("ukfaas.local.toml");
        if local_file.exists() {
            builder = builder.add_source(
                config::File::from(local_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Environment variables (UKFAAS_*)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> UkfaasConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
