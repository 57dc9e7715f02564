//! Plugin and deployment error types

use crate::plugin::Handler;
use fleetdeploy_core::{ConfigurationError, ServiceState};
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a backend client (transport or API level)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    /// HTTP-like status code, when the backend reports one
    pub status_code: Option<u16>,
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
        }
    }

    pub fn with_status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(404)
    }
}

/// Errors scoped to a single workload deployment
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeploymentError {
    #[error("Backend rejected deployment of '{workload}': {message}")]
    Rejected { workload: String, message: String },

    #[error(
        "Deployment of '{workload}' failed (state: {state}, task state: '{raw_state}'): {error}"
    )]
    TaskFailed {
        workload: String,
        state: ServiceState,
        raw_state: String,
        error: String,
    },

    #[error("Timed out after {}s waiting for '{workload}' to become ready (last state: {state})", .elapsed.as_secs())]
    TimedOut {
        workload: String,
        state: ServiceState,
        elapsed: Duration,
    },

    #[error("Deployment of '{workload}' was cancelled (last state: {state})")]
    Cancelled {
        workload: String,
        state: ServiceState,
    },

    #[error("Backend error while deploying '{workload}': {source}")]
    Backend {
        workload: String,
        #[source]
        source: BackendError,
    },
}

impl DeploymentError {
    pub fn workload(&self) -> &str {
        match self {
            Self::Rejected { workload, .. }
            | Self::TaskFailed { workload, .. }
            | Self::TimedOut { workload, .. }
            | Self::Cancelled { workload, .. }
            | Self::Backend { workload, .. } => workload,
        }
    }

    /// Canonical state observed when the deployment stopped, if any
    pub fn state(&self) -> Option<ServiceState> {
        match self {
            Self::TaskFailed { state, .. }
            | Self::TimedOut { state, .. }
            | Self::Cancelled { state, .. } => Some(*state),
            Self::Rejected { .. } | Self::Backend { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Errors returned through the action router
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin '{plugin}' does not support {handler}")]
    Unsupported { plugin: String, handler: Handler },

    #[error("Plugin '{plugin}' advertises workload kinds but does not implement {handler}")]
    MissingHandler { plugin: String, handler: Handler },

    #[error("Plugin '{0}' is already registered")]
    DuplicatePlugin(String),

    #[error("Workload '{workload}' is not ready (state: {state})")]
    WorkloadNotReady {
        workload: String,
        state: ServiceState,
    },

    #[error("Invalid spec for workload '{workload}': {message}")]
    InvalidSpec { workload: String, message: String },

    #[error("Backend error in plugin '{plugin}': {source}")]
    Backend {
        plugin: String,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error(transparent)]
    Deployment(#[from] DeploymentError),
}

impl PluginError {
    pub fn unsupported(plugin: impl Into<String>, handler: Handler) -> Self {
        Self::Unsupported {
            plugin: plugin.into(),
            handler,
        }
    }

    pub fn backend(plugin: impl Into<String>, source: BackendError) -> Self {
        Self::Backend {
            plugin: plugin.into(),
            source,
        }
    }

    /// Lets callers skip an optional capability instead of failing
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
