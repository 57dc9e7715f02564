//! Provider dependency graph
//!
//! Nodes are provider names. Edges come from two places: static dependencies
//! declared by each provider's plugin, and implicit ones found by scanning the
//! provider's config for `${providers.<name>...}` references.

use crate::error::{ConfigurationError, Result};
use crate::model::ProviderConfig;
use crate::template::ReferenceExtractor;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Root segment of a reference to another provider
pub const PROVIDER_REFERENCE_ROOT: &str = "providers";

/// Dependency graph with a deterministic execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    /// provider name -> dependency names (sorted, unique)
    edges: BTreeMap<String, Vec<String>>,

    /// Every provider after all of its dependencies
    order: Vec<String>,
}

impl DependencyGraph {
    /// Build the graph and compute the execution order.
    ///
    /// `declared` maps a provider name to the static dependencies its plugin
    /// declares. Configs must already be validated.
    pub fn build(
        configs: &[ProviderConfig],
        declared: &HashMap<String, Vec<String>>,
        extractor: &dyn ReferenceExtractor,
    ) -> Result<Self> {
        let mut edges = BTreeMap::new();

        for config in configs {
            let static_deps = declared
                .get(&config.name)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let deps = provider_dependencies(config, static_deps, extractor)?;

            debug!(provider = %config.name, dependencies = ?deps, "Resolved provider dependencies");

            if edges.insert(config.name.clone(), deps).is_some() {
                return Err(ConfigurationError::DuplicateProvider(config.name.clone()));
            }
        }

        let order = topological_order(&edges)?;
        debug!(order = ?order, "Computed provider order");

        Ok(Self { edges, order })
    }

    /// Providers in execution order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn into_order(self) -> Vec<String> {
        self.order
    }

    /// Direct dependencies of `name`, sorted by name
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Dependencies implied by `${providers.<name>...}` references in `config`
pub fn implicit_dependencies(
    config: &ProviderConfig,
    extractor: &dyn ReferenceExtractor,
) -> Result<BTreeSet<String>> {
    let mut deps = BTreeSet::new();

    for key in extractor.collect(&config.to_value()) {
        if key.first().map(String::as_str) != Some(PROVIDER_REFERENCE_ROOT) {
            continue;
        }

        match key.get(1).filter(|name| !name.is_empty()) {
            Some(name) => {
                deps.insert(name.clone());
            }
            None => {
                return Err(ConfigurationError::InvalidTemplateKey {
                    provider: config.name.clone(),
                    key: key.join("."),
                });
            }
        }
    }

    Ok(deps)
}

/// Static plus implicit dependencies of one provider, sorted and unique
pub fn provider_dependencies(
    config: &ProviderConfig,
    declared: &[String],
    extractor: &dyn ReferenceExtractor,
) -> Result<Vec<String>> {
    let mut deps = implicit_dependencies(config, extractor)?;
    deps.extend(declared.iter().cloned());
    Ok(deps.into_iter().collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first topological sort over name-sorted nodes and edges
fn topological_order(edges: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    let mut order = Vec::with_capacity(edges.len());

    for name in edges.keys() {
        visit(name, edges, &mut marks, &mut stack, &mut order)?;
    }

    Ok(order)
}

fn visit<'a>(
    name: &'a str,
    edges: &'a BTreeMap<String, Vec<String>>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<()> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|n| *n == name).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Err(ConfigurationError::CircularDependency { cycle });
        }
        None => {}
    }

    // Names that are not nodes are dangling; the registry reports them
    let Some(deps) = edges.get(name) else {
        return Ok(());
    };

    marks.insert(name, Mark::Visiting);
    stack.push(name);

    for dep in deps {
        visit(dep, edges, marks, stack, order)?;
    }

    stack.pop();
    marks.insert(name, Mark::Done);
    order.push(name.to_string());

    Ok(())
}
