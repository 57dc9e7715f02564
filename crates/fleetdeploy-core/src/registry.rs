//! Provider registry
//!
//! Materializes [`Provider`] records once the dependency order is known. The
//! walk follows [`DependencyGraph::order`], so every dependency is already
//! resolved by the time a provider that needs it is built.

use crate::error::{ConfigurationError, Result};
use crate::graph::DependencyGraph;
use crate::model::{
    DEFAULT_PROVIDER_NAME, EnvironmentStatus, Provider, ProviderConfig, ProviderMap,
    WorkloadConfig,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Resolve every provider in `graph` order.
///
/// `workloads` maps an owning provider name to the workloads it will deploy.
/// The synthetic default provider is always part of the result.
pub fn resolve(
    graph: &DependencyGraph,
    configs: &[ProviderConfig],
    mut workloads: BTreeMap<String, Vec<WorkloadConfig>>,
) -> Result<ProviderMap> {
    let by_name: HashMap<&str, &ProviderConfig> =
        configs.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut providers = ProviderMap::new();

    for name in graph.order() {
        let Some(config) = by_name.get(name.as_str()) else {
            continue;
        };

        let dependencies = graph
            .dependencies(name)
            .iter()
            .map(|dep| {
                providers.get(dep).cloned().ok_or_else(|| {
                    ConfigurationError::DanglingDependency {
                        provider: name.clone(),
                        dependency: dep.clone(),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let owned = workloads.remove(name).unwrap_or_default();

        debug!(
            provider = %name,
            dependencies = dependencies.len(),
            workloads = owned.len(),
            "Resolved provider"
        );

        let provider = Provider::from_config(
            (*config).clone(),
            dependencies,
            owned,
            EnvironmentStatus::default(),
        );
        providers.insert(name.clone(), Arc::new(provider));
    }

    // Workloads left over point at providers that were never configured
    if let Some(workload) = workloads.into_values().flatten().next() {
        return Err(ConfigurationError::UnknownWorkloadOwner {
            workload: workload.name,
            kind: workload.kind,
        });
    }

    providers.insert(
        DEFAULT_PROVIDER_NAME.to_string(),
        Arc::new(Provider::default_provider()),
    );

    info!(count = providers.len(), "Provider registry resolved");
    Ok(providers)
}
