use fleetdeploy_core::ConfigurationError;
use fleetdeploy_plugin::{DeploymentError, PluginError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("Environment of provider '{provider}' is not ready")]
    EnvironmentNotReady { provider: String },

    #[error("Workload '{0}' is not owned by any resolved provider")]
    UnknownWorkload(String),

    #[error("Deployment task for workload '{workload}' aborted: {message}")]
    TaskAborted { workload: String, message: String },
}

impl OrchestrationError {
    /// The per-workload deployment failure, if this is one
    pub fn deployment(&self) -> Option<&DeploymentError> {
        match self {
            Self::Plugin(PluginError::Deployment(e)) => Some(e),
            _ => None,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Plugin(PluginError::Config(_)))
    }
}

pub type Result<T> = std::result::Result<T, OrchestrationError>;
