//! Environment status

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Status of a provider's environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentStatus {
    pub ready: bool,

    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,

    /// Only reported by pre-init checks. `Some(false)` means the environment
    /// exists but has not been initialized yet, which is not an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured: Option<bool>,
}

impl EnvironmentStatus {
    pub fn ready() -> Self {
        Self {
            ready: true,
            outputs: BTreeMap::new(),
            configured: None,
        }
    }

    pub fn configured() -> Self {
        Self {
            ready: true,
            outputs: BTreeMap::new(),
            configured: Some(true),
        }
    }

    pub fn not_configured() -> Self {
        Self {
            ready: false,
            outputs: BTreeMap::new(),
            configured: Some(false),
        }
    }

    pub fn with_outputs(mut self, outputs: BTreeMap<String, Value>) -> Self {
        self.outputs = outputs;
        self
    }

    /// `configured` defaults to true when a plugin does not report it
    pub fn needs_configure(&self) -> bool {
        self.configured == Some(false)
    }
}

/// Holder for a status record that is only ever swapped as a whole
#[derive(Debug, Default)]
pub(crate) struct StatusCell(RwLock<Arc<EnvironmentStatus>>);

impl StatusCell {
    pub(crate) fn new(status: EnvironmentStatus) -> Self {
        Self(RwLock::new(Arc::new(status)))
    }

    pub(crate) fn load(&self) -> Arc<EnvironmentStatus> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn replace(&self, status: EnvironmentStatus) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_configure() {
        assert!(EnvironmentStatus::not_configured().needs_configure());
        assert!(!EnvironmentStatus::configured().needs_configure());
        assert!(!EnvironmentStatus::ready().needs_configure());
        assert!(!EnvironmentStatus::default().needs_configure());
    }

    #[test]
    fn test_configured_is_omitted_when_unset() {
        let json = serde_json::to_string(&EnvironmentStatus::ready()).unwrap();
        assert!(!json.contains("configured"));

        let status: EnvironmentStatus =
            serde_json::from_str(r#"{"ready":false,"configured":false}"#).unwrap();
        assert_eq!(status, EnvironmentStatus::not_configured());
    }
}
