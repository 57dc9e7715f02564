//! Canonical state mapping
//!
//! Backends report task states in their own vocabulary. Everything above the
//! plugin boundary only sees [`ServiceState`].

use fleetdeploy_core::ServiceState;

/// Docker Swarm task states
///
/// See <https://docs.docker.com/engine/swarm/how-swarm-mode-works/swarm-task-states/>
pub const TASK_STATE_TABLE: &[(&str, ServiceState)] = &[
    ("new", ServiceState::Deploying),
    ("allocated", ServiceState::Deploying),
    ("pending", ServiceState::Deploying),
    ("assigned", ServiceState::Deploying),
    ("accepted", ServiceState::Deploying),
    ("preparing", ServiceState::Deploying),
    ("starting", ServiceState::Deploying),
    ("ready", ServiceState::Ready),
    ("running", ServiceState::Ready),
    ("complete", ServiceState::Stopped),
    ("shutdown", ServiceState::Stopped),
    ("failed", ServiceState::Unhealthy),
    ("rejected", ServiceState::Unhealthy),
];

/// Map a backend task state to its canonical state.
///
/// Matching ignores ASCII case. Anything outside the table is `Unknown`,
/// which the reconciler treats as still in progress.
pub fn map_task_state(raw: &str) -> ServiceState {
    let raw = raw.trim();
    TASK_STATE_TABLE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(raw))
        .map(|(_, state)| *state)
        .unwrap_or(ServiceState::Unknown)
}
