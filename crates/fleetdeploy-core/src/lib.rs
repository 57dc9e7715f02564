//! FleetDeploy Core
//!
//! Provider model and the synchronous half of an orchestration run: config
//! validation, implicit dependency discovery, dependency ordering and provider
//! resolution. Nothing here talks to a backend.
//!
//! # Resolution flow
//!
//! ```text
//! ProviderConfig[] ──validate──▶ DependencyGraph::build ──order──▶ registry::resolve
//!                                      ▲                                 │
//!                  ReferenceExtractor ─┘                                 ▼
//!                  (${providers.<name>...})                         ProviderMap
//!                                                                  (+ "_default")
//! ```

pub mod error;
pub mod graph;
pub mod model;
pub mod registry;
pub mod settings;
pub mod template;
pub mod validate;

// Re-exports
pub use error::{ConfigurationError, Result, ValidationError};
pub use graph::{DependencyGraph, PROVIDER_REFERENCE_ROOT};
pub use model::*;
pub use settings::{DeploySettings, PollSettings};
pub use template::{
    ReferenceExtractor, ReferencePath, TemplateReferenceCollector, collect_template_references,
};
pub use validate::{ConfigValidator, IdentifierValidator};
