//! Run settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! settings file (format picked by extension), then `FLEET_DEPLOY_*`
//! environment variables.

use crate::error::{ConfigurationError, Result};
use crate::validate::check_identifier;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "FLEET_DEPLOY";
pub const DEFAULT_ENVIRONMENT: &str = "local";
pub const DEFAULT_DEPLOY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Settings for one orchestration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Project name, used as the prefix of backend-side resource names
    pub project_name: String,

    /// Active environment (e.g. "local", "dev")
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub namespace: Option<String>,

    /// Per-workload reconciliation budget
    #[serde(default = "default_deploy_timeout_secs")]
    pub deploy_timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn default_deploy_timeout_secs() -> u64 {
    DEFAULT_DEPLOY_TIMEOUT_SECS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Interval and budget of the reconciliation poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_secs(DEFAULT_DEPLOY_TIMEOUT_SECS),
        }
    }
}

impl DeploySettings {
    pub fn new(project_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            environment: environment.into(),
            namespace: None,
            deploy_timeout_secs: DEFAULT_DEPLOY_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Load settings from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("environment", DEFAULT_ENVIRONMENT)
            .and_then(|b| b.set_default("deploy_timeout_secs", DEFAULT_DEPLOY_TIMEOUT_SECS as i64))
            .and_then(|b| b.set_default("poll_interval_ms", DEFAULT_POLL_INTERVAL_MS as i64))
            .map_err(settings_error)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let settings: Self = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(settings_error)?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        check_identifier(&self.project_name).map_err(|message| {
            ConfigurationError::Settings(format!("project_name: {message}"))
        })?;
        check_identifier(&self.environment).map_err(|message| {
            ConfigurationError::Settings(format!("environment: {message}"))
        })?;

        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::Settings(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.deploy_timeout_secs.saturating_mul(1000) < self.poll_interval_ms {
            return Err(ConfigurationError::Settings(format!(
                "deploy_timeout_secs ({}s) is shorter than one poll interval ({}ms)",
                self.deploy_timeout_secs, self.poll_interval_ms
            )));
        }
        Ok(())
    }

    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poller(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval(),
            timeout: self.deploy_timeout(),
        }
    }
}

fn settings_error(err: config::ConfigError) -> ConfigurationError {
    ConfigurationError::Settings(err.to_string())
}
