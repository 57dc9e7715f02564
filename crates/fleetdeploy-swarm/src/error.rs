use fleetdeploy_plugin::{BackendError, PluginError};
use thiserror::Error;

use crate::plugin::PLUGIN_NAME;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Docker daemon unreachable ({0}); is dockerd up, and does DOCKER_HOST point at it?")]
    ConnectionFailed(String),

    #[error("Invalid spec for workload '{workload}': {message}")]
    InvalidSpec { workload: String, message: String },

    #[error("Service '{service}' has no running container")]
    NoRunningContainer { service: String },

    #[error("Docker API error ({status_code}): {message}")]
    Api { status_code: u16, message: String },

    #[error("Docker API error: {0}")]
    Docker(String),
}

impl SwarmError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SwarmError::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Docker answers 503 when the node is not part of a swarm
    pub fn is_not_swarm_manager(&self) -> bool {
        self.status_code() == Some(503)
    }
}

impl From<bollard::errors::Error> for SwarmError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => SwarmError::Api {
                status_code,
                message,
            },
            other => {
                let err_str = other.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    SwarmError::ConnectionFailed(err_str)
                } else {
                    SwarmError::Docker(err_str)
                }
            }
        }
    }
}

impl From<SwarmError> for BackendError {
    fn from(err: SwarmError) -> Self {
        match err {
            SwarmError::Api {
                status_code,
                message,
            } => BackendError::with_status(status_code, message),
            other => BackendError::new(other.to_string()),
        }
    }
}

impl From<SwarmError> for PluginError {
    fn from(err: SwarmError) -> Self {
        match err {
            SwarmError::InvalidSpec { workload, message } => {
                PluginError::InvalidSpec { workload, message }
            }
            other => PluginError::backend(PLUGIN_NAME, other.into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;
