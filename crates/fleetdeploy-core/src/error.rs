//! Configuration error types
//!
//! Every variant is attributable to a specific provider or config path, and
//! every one of them is fatal to an orchestration run.

use thiserror::Error;

/// A validator failure for a single provider config field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid value at '{path}' in provider '{provider}': {message}")]
pub struct ValidationError {
    pub provider: String,
    /// Field path inside the provider config (e.g. `environments[1]`)
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        provider: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Provider '{0}' is configured more than once")]
    DuplicateProvider(String),

    #[error(
        "Invalid template key '{key}' in configuration for provider '{provider}'. \
         You must specify a provider name as well (e.g. ${{providers.my-provider}})"
    )]
    InvalidTemplateKey { provider: String, key: String },

    #[error("Circular dependency detected between providers: {}", .cycle.join(" -> "))]
    CircularDependency {
        /// Provider names forming the cycle; the first name is repeated at the end
        cycle: Vec<String>,
    },

    #[error("Provider '{provider}' depends on '{dependency}', which is not configured")]
    DanglingDependency { provider: String, dependency: String },

    #[error("Provider '{0}' has no registered plugin")]
    UnknownPlugin(String),

    #[error("Workload '{0}' is defined more than once")]
    DuplicateWorkload(String),

    #[error(
        "Workload '{workload}' is assigned to provider '{provider}', \
         which does not handle kind '{kind}'"
    )]
    WorkloadKindMismatch {
        workload: String,
        kind: String,
        provider: String,
    },

    #[error("No provider found for workload '{workload}' (kind '{kind}')")]
    UnknownWorkloadOwner { workload: String, kind: String },

    #[error(
        "Workload '{workload}' (kind '{kind}') matches several providers: {}. \
         Set `provider` on the workload to pick one",
        .candidates.join(", ")
    )]
    AmbiguousWorkloadOwner {
        workload: String,
        kind: String,
        candidates: Vec<String>,
    },

    #[error("Invalid settings: {0}")]
    Settings(String),
}

impl ConfigurationError {
    /// Name of the provider this error is attributed to, when there is one.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Validation(e) => Some(&e.provider),
            Self::DuplicateProvider(name) | Self::UnknownPlugin(name) => Some(name),
            Self::InvalidTemplateKey { provider, .. }
            | Self::DanglingDependency { provider, .. }
            | Self::WorkloadKindMismatch { provider, .. } => Some(provider),
            Self::CircularDependency { cycle } => cycle.first().map(String::as_str),
            Self::DuplicateWorkload(_)
            | Self::UnknownWorkloadOwner { .. }
            | Self::AmbiguousWorkloadOwner { .. }
            | Self::Settings(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;
