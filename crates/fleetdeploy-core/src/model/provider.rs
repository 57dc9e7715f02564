//! Provider definitions
//!
//! `ProviderConfig` is what the user writes; `Provider` is the resolved,
//! runtime record created once the dependency order is known.

use super::status::{EnvironmentStatus, StatusCell};
use super::workload::WorkloadConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reserved name of the synthetic fallback provider
pub const DEFAULT_PROVIDER_NAME: &str = "_default";

/// Raw provider configuration
///
/// `name` and `environments` are the fixed fields every provider has. Any
/// other key is provider specific and kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name of the provider plugin to use (e.g. "local-docker-swarm")
    pub name: String,

    /// If set, the provider is only used in the listed environments.
    /// An empty list disables the provider everywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environments: Option<Vec<String>>,

    /// Provider specific fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environments: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_environments<I, S>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environments = Some(environments.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Get a provider specific field as a specific type
    pub fn get_field<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether this provider is active in the given environment
    pub fn is_enabled_in(&self, environment: &str) -> bool {
        match &self.environments {
            None => true,
            Some(envs) => envs.iter().any(|e| e == environment),
        }
    }

    /// The whole config as one value tree, fixed fields included
    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        map.insert("name".to_string(), Value::String(self.name.clone()));
        if let Some(envs) = &self.environments {
            map.insert(
                "environments".to_string(),
                Value::Array(envs.iter().cloned().map(Value::String).collect()),
            );
        }
        Value::Object(map)
    }
}

/// Resolved provider
///
/// Immutable after construction except for `status`, which is replaced as a
/// whole record when the environment status is refreshed.
#[derive(Debug)]
pub struct Provider {
    pub name: String,

    /// Already-resolved providers this one depends on, sorted by name
    pub dependencies: Vec<Arc<Provider>>,

    pub environments: Option<Vec<String>>,

    /// Workloads this provider owns
    pub workload_configs: Vec<WorkloadConfig>,

    pub config: ProviderConfig,

    status: StatusCell,
}

impl Provider {
    pub fn from_config(
        config: ProviderConfig,
        dependencies: Vec<Arc<Provider>>,
        workload_configs: Vec<WorkloadConfig>,
        status: EnvironmentStatus,
    ) -> Self {
        Self {
            name: config.name.clone(),
            dependencies,
            environments: config.environments.clone(),
            workload_configs,
            config,
            status: StatusCell::new(status),
        }
    }

    /// The neutral fallback provider: no dependencies, no workloads, ready.
    pub fn default_provider() -> Self {
        Self::from_config(
            ProviderConfig::new(DEFAULT_PROVIDER_NAME),
            Vec::new(),
            Vec::new(),
            EnvironmentStatus::ready(),
        )
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_PROVIDER_NAME
    }

    /// Snapshot of the last known environment status
    pub fn status(&self) -> Arc<EnvironmentStatus> {
        self.status.load()
    }

    /// Replace the environment status record
    pub fn set_status(&self, status: EnvironmentStatus) {
        self.status.replace(status);
    }

    pub fn dependency_names(&self) -> Vec<&str> {
        self.dependencies.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn owns_workload(&self, name: &str) -> bool {
        self.workload_configs.iter().any(|w| w.name == name)
    }
}

/// Resolved providers keyed by name
pub type ProviderMap = BTreeMap<String, Arc<Provider>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_config_extra_fields_round_trip_yaml() {
        let yaml = r#"
name: local-docker-swarm
environments: [local, dev]
namespace: my-ns
context: "${providers.kube.outputs.context}"
"#;
        let config: ProviderConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.name, "local-docker-swarm");
        assert_eq!(
            config.environments,
            Some(vec!["local".to_string(), "dev".to_string()])
        );
        assert_eq!(config.get_field::<String>("namespace").unwrap(), "my-ns");
        assert!(config.extra.contains_key("context"));
        assert!(!config.extra.contains_key("name"));
    }

    #[test]
    fn test_environment_activation() {
        let everywhere = ProviderConfig::new("a");
        assert!(everywhere.is_enabled_in("prod"));

        let dev_only = ProviderConfig::new("a").with_environments(["dev"]);
        assert!(dev_only.is_enabled_in("dev"));
        assert!(!dev_only.is_enabled_in("prod"));

        let disabled = ProviderConfig::new("a").with_environments(Vec::<String>::new());
        assert!(!disabled.is_enabled_in("dev"));
    }

    #[test]
    fn test_to_value_includes_fixed_fields() {
        let config = ProviderConfig::new("a")
            .with_environments(["dev"])
            .with_field("nested", json!({ "key": "value" }));

        let value = config.to_value();
        assert_eq!(value["name"], "a");
        assert_eq!(value["environments"], json!(["dev"]));
        assert_eq!(value["nested"]["key"], "value");
    }

    #[test]
    fn test_default_provider() {
        let provider = Provider::default_provider();
        assert!(provider.is_default());
        assert!(provider.dependencies.is_empty());
        assert!(provider.workload_configs.is_empty());
        assert!(provider.status().ready);
    }

    #[test]
    fn test_status_replace_is_whole_record() {
        let provider = Provider::from_config(
            ProviderConfig::new("a"),
            Vec::new(),
            Vec::new(),
            EnvironmentStatus::default(),
        );
        let before = provider.status();

        let mut outputs = BTreeMap::new();
        outputs.insert("host".to_string(), json!("localhost"));
        provider.set_status(EnvironmentStatus::ready().with_outputs(outputs));

        // Earlier snapshots are untouched
        assert!(!before.ready);
        assert!(before.outputs.is_empty());

        let after = provider.status();
        assert!(after.ready);
        assert_eq!(after.outputs["host"], "localhost");
    }
}
