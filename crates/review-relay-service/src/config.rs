//! Service configuration.
//!
//! A YAML document lists the analyzers, the watched repositories, and
//! provider options. Environment variables prefixed `RELAY__` override
//! file values (double-underscore separator, e.g.
//! `RELAY__PROVIDERS__GITHUB__WEBHOOKS=true`). Every field carries a
//! serde default, so a missing file still yields a valid configuration;
//! a malformed file is a hard error.

use review_relay_core::AnalyzerConfig;
use review_relay_github::ProviderConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Clone URLs of repositories to watch, merged with any passed on
    /// the command line.
    #[serde(default)]
    pub repositories: Vec<String>,

    #[serde(default)]
    pub analyzers: Vec<AnalyzerConfig>,

    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Filesystem event-store path; in-memory when unset.
    #[serde(default)]
    pub store: Option<PathBuf>,

    /// Per-analyzer call timeout in seconds.
    #[serde(default)]
    pub analyzer_timeout_secs: Option<u64>,
}

/// Provider-specific option blocks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub github: ProviderConfig,
}

impl RelayConfig {
    /// Load the configuration file (optional) plus `RELAY__` environment
    /// overrides, then validate.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::with_name(path)
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(config::Environment::with_prefix("RELAY").separator("__"))
            .build()?;

        let config: RelayConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for analyzer in &self.analyzers {
            if analyzer.name.is_empty() {
                return Err(ConfigError::Invalid {
                    message: "analyzer with empty name".to_string(),
                });
            }
            if analyzer.addr.is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("analyzer '{}' has no address", analyzer.name),
                });
            }
            if !names.insert(analyzer.name.as_str()) {
                return Err(ConfigError::Invalid {
                    message: format!("duplicate analyzer name '{}'", analyzer.name),
                });
            }
        }

        if self.providers.github.webhooks && self.providers.github.webhook_secret.is_empty() {
            return Err(ConfigError::Invalid {
                message: "webhook mode requires providers.github.webhook_secret".to_string(),
            });
        }

        Ok(())
    }
}
