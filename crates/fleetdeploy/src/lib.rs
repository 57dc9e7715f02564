//! FleetDeploy
//!
//! Multi-provider deployment orchestration. A run has two phases:
//!
//! ```text
//! resolve:  validate ─▶ environment filter ─▶ DependencyGraph ─▶ registry
//!                                                                   │
//!           prepare_environment (dependency order) ◀────────────────┘
//!
//! deploy:   one task per workload ─▶ ActionRouter ─▶ Plugin ─▶ Reconciler
//! ```
//!
//! Resolution finishes completely before any workload is deployed. Workload
//! failures are reported per workload and never abort siblings.

pub mod error;
pub mod orchestrator;
pub mod telemetry;

pub use error::{OrchestrationError, Result};
pub use orchestrator::{DeployReport, Orchestrator, Resolved, WorkloadOutcome};
pub use telemetry::init_tracing;

pub use fleetdeploy_core;
pub use fleetdeploy_plugin;
pub use fleetdeploy_swarm;
