//! FleetDeploy Plugin Interface
//!
//! The asynchronous half of an orchestration run: the capability trait every
//! backend implements, the router that dispatches generic actions to it, and
//! the reconciler that drives a workload until it converges.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ActionRouter                 │
//! │  provider name ─▶ Arc<dyn Plugin> + handlers │
//! └──────────────────────┬───────────────────────┘
//!                        │ deploy_workload(ctx, ...)
//! ┌──────────────────────▼───────────────────────┐
//! │                    Plugin                    │
//! │  (e.g. fleetdeploy-swarm)                    │
//! └──────────────────────┬───────────────────────┘
//!                        │ Reconciler<B: DeploymentBackend>
//! ┌──────────────────────▼───────────────────────┐
//! │  submit ─▶ Poller::run(tick) ─▶ describe     │
//! │              │                               │
//! │              └─ map_task_state(raw)          │
//! └──────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod dispatch;
pub mod error;
pub mod plugin;
pub mod poll;
pub mod reconcile;
pub mod state;

// Re-exports
pub use context::PluginContext;
pub use dispatch::ActionRouter;
pub use error::{BackendError, DeploymentError, PluginError, Result};
pub use plugin::{DeployParams, ExecResult, Handler, HandlerSet, Plugin, WorkloadOutputs};
pub use poll::{PollError, Poller, Tick};
pub use reconcile::{
    DeployPhase, DeploymentBackend, DeploymentTask, Reconciler, ServiceHandle, TaskRecord,
    latest_task,
};
pub use state::{TASK_STATE_TABLE, map_task_state};
