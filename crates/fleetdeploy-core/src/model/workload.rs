//! Workload definitions and their observable status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A deployable unit owned by exactly one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Workload name, unique within a project
    pub name: String,

    /// Workload kind (e.g. "container"); selects the owning plugin
    pub kind: String,

    /// Explicit owning provider. Overrides kind-based lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Kind specific desired spec, interpreted by the owning plugin
    #[serde(default)]
    pub spec: Value,
}

impl WorkloadConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            provider: None,
            spec: Value::Null,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }
}

/// Canonical, backend-agnostic workload state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Being rolled out
    Deploying,
    /// Running and serving
    Ready,
    /// Exited or shut down
    Stopped,
    /// Failed or rejected by the backend
    Unhealthy,
    /// The backend has no such workload (or no task for it yet)
    Missing,
    /// The backend reported a status outside the known vocabulary
    #[default]
    Unknown,
}

impl ServiceState {
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Deploying => write!(f, "deploying"),
            ServiceState::Ready => write!(f, "ready"),
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Unhealthy => write!(f, "unhealthy"),
            ServiceState::Missing => write!(f, "missing"),
            ServiceState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Observable status of a deployed workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    /// Backend-assigned identity (e.g. a swarm service ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    pub state: ServiceState,

    /// Deployed version (image tag or similar)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Full image reference, when the backend runs images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_replicas: Option<u64>,

    /// Endpoints the workload is reachable at
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl WorkloadStatus {
    /// Status for a workload the backend does not know about
    pub fn missing() -> Self {
        Self {
            state: ServiceState::Missing,
            ..Default::default()
        }
    }

    pub fn exists(&self) -> bool {
        self.provider_id.is_some()
    }
}
