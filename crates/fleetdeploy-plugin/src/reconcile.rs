//! Deployment reconciler
//!
//! Drives one workload through
//! `Absent -> Submitting -> Polling -> {Ready | Failed | TimedOut}`
//! against a [`DeploymentBackend`]. Polling goes through the shared
//! [`Poller`], so every reconciler honours the same interval, budget and
//! cancellation token.

use crate::error::{BackendError, DeploymentError};
use crate::poll::{PollError, Poller, Tick};
use crate::state::map_task_state;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetdeploy_core::{ServiceState, WorkloadStatus};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Backend-side handle of an existing service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub id: String,
    /// Revision token the backend expects on update
    pub revision: Option<u64>,
}

/// One backend task record (a scheduled instance of a service)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskRecord {
    pub id: Option<String>,
    /// Raw backend state, e.g. "preparing"
    pub state: String,
    /// Backend error attached to the task, if any
    pub error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// The attached error, ignoring empty strings
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.trim().is_empty())
    }
}

/// Opaque client interface of a service-oriented backend
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// Backend specific desired spec
    type Spec: Send + Sync;

    /// Look up an existing service by name
    async fn find_service(&self, name: &str) -> Result<Option<ServiceHandle>, BackendError>;

    /// Create a service, returning its backend id
    async fn create_service(&self, spec: &Self::Spec) -> Result<String, BackendError>;

    async fn update_service(
        &self,
        handle: &ServiceHandle,
        spec: &Self::Spec,
    ) -> Result<(), BackendError>;

    /// All task records of a service, in any order
    async fn list_tasks(&self, service_id: &str) -> Result<Vec<TaskRecord>, BackendError>;

    /// Full status snapshot of a service
    async fn describe(&self, name: &str) -> Result<WorkloadStatus, BackendError>;

    /// Map a raw task state to the canonical set
    fn map_state(&self, raw: &str) -> ServiceState {
        map_task_state(raw)
    }
}

/// Pick the most recently created task. Records without a timestamp sort last.
pub fn latest_task(mut tasks: Vec<TaskRecord>) -> Option<TaskRecord> {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    tasks.into_iter().next()
}

/// Reconciler state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPhase {
    Absent,
    Submitting,
    Polling,
    Ready,
    Failed,
    TimedOut,
    Cancelled,
}

impl DeployPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Ready | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Submitting => "submitting",
            Self::Polling => "polling",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One deploy attempt of one workload
#[derive(Debug)]
pub struct DeploymentTask<S> {
    pub workload: String,
    /// Backend-side service name
    pub service_name: String,
    pub spec: S,
    pub phase: DeployPhase,
    /// Backend id, set once the service exists
    pub provider_id: Option<String>,
    /// Set when submission starts
    pub started_at: Option<Instant>,
    /// Number of poll ticks run so far
    pub polls: u32,
}

impl<S> DeploymentTask<S> {
    pub fn new(workload: impl Into<String>, service_name: impl Into<String>, spec: S) -> Self {
        Self {
            workload: workload.into(),
            service_name: service_name.into(),
            spec,
            phase: DeployPhase::Absent,
            provider_id: None,
            started_at: None,
            polls: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    fn transition(&mut self, phase: DeployPhase) {
        debug!(workload = %self.workload, from = %self.phase, to = %phase, "Deployment phase");
        self.phase = phase;
    }
}

pub struct Reconciler<'a, B: DeploymentBackend> {
    backend: &'a B,
    poller: Poller,
    cancel: CancellationToken,
}

impl<'a, B: DeploymentBackend> Reconciler<'a, B> {
    pub fn new(backend: &'a B, poller: Poller, cancel: CancellationToken) -> Self {
        Self {
            backend,
            poller,
            cancel,
        }
    }

    /// Submit `task` and poll until it converges.
    ///
    /// On success the returned status is a fresh snapshot from the backend.
    #[instrument(skip_all, fields(workload = %task.workload, service = %task.service_name))]
    pub async fn reconcile(
        &self,
        task: &mut DeploymentTask<B::Spec>,
    ) -> Result<WorkloadStatus, DeploymentError> {
        let started = Instant::now();
        task.started_at = Some(started);
        task.transition(DeployPhase::Submitting);

        let service_id = match self.submit(task).await {
            Ok(id) => id,
            Err(e) => {
                task.transition(DeployPhase::Failed);
                return Err(e);
            }
        };
        task.provider_id = Some(service_id.clone());
        task.transition(DeployPhase::Polling);

        let workload = task.workload.clone();
        let polls = AtomicU32::new(0);
        let outcome = self
            .poller
            .run_from(started, &self.cancel, || {
                polls.fetch_add(1, Ordering::Relaxed);
                self.observe(&workload, &service_id)
            })
            .await;
        task.polls = polls.load(Ordering::Relaxed);

        match outcome {
            Ok(()) => {}
            Err(PollError::Failed(e)) => {
                warn!(error = %e, "Deployment failed");
                task.transition(DeployPhase::Failed);
                return Err(e);
            }
            Err(PollError::TimedOut { last, elapsed, .. }) => {
                warn!(state = %last, polls = task.polls, "Deployment timed out");
                task.transition(DeployPhase::TimedOut);
                return Err(DeploymentError::TimedOut {
                    workload,
                    state: last,
                    elapsed,
                });
            }
            Err(PollError::Cancelled { last, .. }) => {
                info!(state = %last, polls = task.polls, "Deployment cancelled");
                task.transition(DeployPhase::Cancelled);
                return Err(DeploymentError::Cancelled {
                    workload,
                    state: last,
                });
            }
        }

        task.transition(DeployPhase::Ready);

        let status = self
            .backend
            .describe(&task.service_name)
            .await
            .map_err(|source| DeploymentError::Backend {
                workload: workload.clone(),
                source,
            })?;

        info!(
            provider_id = status.provider_id.as_deref().unwrap_or_default(),
            version = status.version.as_deref().unwrap_or_default(),
            "Workload ready"
        );
        Ok(status)
    }

    /// Create the service, or update it if the backend already has one
    async fn submit(&self, task: &DeploymentTask<B::Spec>) -> Result<String, DeploymentError> {
        let existing = self
            .backend
            .find_service(&task.service_name)
            .await
            .map_err(|source| DeploymentError::Backend {
                workload: task.workload.clone(),
                source,
            })?;

        let rejected = |e: BackendError| DeploymentError::Rejected {
            workload: task.workload.clone(),
            message: e.message,
        };

        match existing {
            Some(handle) => {
                debug!(service_id = %handle.id, revision = ?handle.revision, "Updating service");
                self.backend
                    .update_service(&handle, &task.spec)
                    .await
                    .map_err(rejected)?;
                Ok(handle.id)
            }
            None => {
                debug!("Creating service");
                self.backend.create_service(&task.spec).await.map_err(rejected)
            }
        }
    }

    /// One poll tick: inspect the newest task of the service.
    ///
    /// An attached error is terminal whatever state the task is in. Without
    /// one, only `ready` ends the loop; every other state keeps polling.
    async fn observe(
        &self,
        workload: &str,
        service_id: &str,
    ) -> Result<Tick<()>, DeploymentError> {
        let tasks = self
            .backend
            .list_tasks(service_id)
            .await
            .map_err(|source| DeploymentError::Backend {
                workload: workload.to_string(),
                source,
            })?;
        let count = tasks.len();

        let Some(task) = latest_task(tasks) else {
            return Ok(Tick::Pending(ServiceState::Missing));
        };
        let state = self.backend.map_state(&task.state);

        if let Some(error) = task.error_message() {
            return Err(DeploymentError::TaskFailed {
                workload: workload.to_string(),
                state,
                raw_state: task.state.clone(),
                error: error.to_string(),
            });
        }

        debug!(state = %state, raw_state = %task.state, tasks = count, "Observed task");

        if state.is_ready() {
            Ok(Tick::Done(()))
        } else {
            Ok(Tick::Pending(state))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fleetdeploy_core::PollSettings;
    use std::sync::Mutex;

    /// Scripted backend: `script(n)` returns the tasks seen on poll `n` (1-based)
    struct ScriptedBackend<F> {
        existing: Option<ServiceHandle>,
        submit_delay: Duration,
        script: F,
        polls: AtomicU32,
        calls: Mutex<Vec<String>>,
    }

    impl<F> ScriptedBackend<F>
    where
        F: Fn(u32) -> Vec<TaskRecord> + Send + Sync,
    {
        fn new(script: F) -> Self {
            Self {
                existing: None,
                submit_delay: Duration::ZERO,
                script,
                polls: AtomicU32::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn existing(mut self, handle: ServiceHandle) -> Self {
            self.existing = Some(handle);
            self
        }

        fn submit_delay(mut self, delay: Duration) -> Self {
            self.submit_delay = delay;
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn polls(&self) -> u32 {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<F> DeploymentBackend for ScriptedBackend<F>
    where
        F: Fn(u32) -> Vec<TaskRecord> + Send + Sync,
    {
        type Spec = String;

        async fn find_service(&self, name: &str) -> Result<Option<ServiceHandle>, BackendError> {
            self.calls.lock().unwrap().push(format!("find {name}"));
            Ok(self.existing.clone())
        }

        async fn create_service(&self, spec: &String) -> Result<String, BackendError> {
            self.calls.lock().unwrap().push(format!("create {spec}"));
            tokio::time::sleep(self.submit_delay).await;
            if spec == "bad" {
                return Err(BackendError::with_status(400, "invalid image"));
            }
            Ok("svc-1".to_string())
        }

        async fn update_service(
            &self,
            handle: &ServiceHandle,
            spec: &String,
        ) -> Result<(), BackendError> {
            self.calls.lock().unwrap().push(format!(
                "update {} @{} {spec}",
                handle.id,
                handle.revision.unwrap_or_default()
            ));
            Ok(())
        }

        async fn list_tasks(&self, service_id: &str) -> Result<Vec<TaskRecord>, BackendError> {
            assert!(service_id.starts_with("svc-"));
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((self.script)(n))
        }

        async fn describe(&self, _name: &str) -> Result<WorkloadStatus, BackendError> {
            Ok(WorkloadStatus {
                provider_id: Some("svc-1".to_string()),
                state: ServiceState::Ready,
                version: Some("1.0.0".to_string()),
                running_replicas: Some(1),
                ..Default::default()
            })
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn reconciler<B: DeploymentBackend>(backend: &B) -> Reconciler<'_, B> {
        Reconciler::new(
            backend,
            Poller::new(PollSettings::default()),
            CancellationToken::new(),
        )
    }

    fn task(spec: &str) -> DeploymentTask<String> {
        DeploymentTask::new("api", "shop--api", spec.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_on_first_poll_is_ready() {
        let backend = ScriptedBackend::new(|_| vec![TaskRecord::new("running")]);
        let mut task = task("api:1.0.0");

        let status = reconciler(&backend).reconcile(&mut task).await.unwrap();

        assert_eq!(backend.polls(), 1);
        assert!(task.elapsed() < Duration::from_secs(2));
        assert_eq!(task.phase, DeployPhase::Ready);
        assert_eq!(task.provider_id.as_deref(), Some("svc-1"));
        assert_eq!(status.state, ServiceState::Ready);
        assert_eq!(status.version.as_deref(), Some("1.0.0"));
        assert_eq!(backend.calls(), ["find shop--api", "create api:1.0.0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preparing_forever_times_out() {
        let backend = ScriptedBackend::new(|_| vec![TaskRecord::new("preparing")]);
        let mut task = task("api:1.0.0");

        let err = reconciler(&backend).reconcile(&mut task).await.unwrap_err();

        match err {
            DeploymentError::TimedOut { state, elapsed, .. } => {
                assert_eq!(state, ServiceState::Deploying);
                assert!(elapsed >= Duration::from_secs(30));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.polls(), 30);
        assert_eq!(task.polls, 30);
        assert_eq!(task.phase, DeployPhase::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_includes_submission_time() {
        let backend = ScriptedBackend::new(|_| vec![TaskRecord::new("preparing")])
            .submit_delay(Duration::from_secs(20));
        let mut task = task("api:1.0.0");

        let err = reconciler(&backend).reconcile(&mut task).await.unwrap_err();

        match err {
            DeploymentError::TimedOut { elapsed, .. } => {
                assert!(elapsed >= Duration::from_secs(30), "{elapsed:?}");
                assert!(elapsed < Duration::from_secs(31), "{elapsed:?}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.polls(), 10);
        assert!(task.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_error_fails_immediately() {
        let backend = ScriptedBackend::new(|n| {
            if n < 3 {
                vec![TaskRecord::new("preparing")]
            } else {
                vec![TaskRecord::new("rejected").with_error("No such image: api:9.9")]
            }
        });
        let mut task = task("api:9.9");

        let err = reconciler(&backend).reconcile(&mut task).await.unwrap_err();

        assert_eq!(
            err,
            DeploymentError::TaskFailed {
                workload: "api".to_string(),
                state: ServiceState::Unhealthy,
                raw_state: "rejected".to_string(),
                error: "No such image: api:9.9".to_string(),
            }
        );
        assert_eq!(backend.polls(), 3);
        assert!(task.elapsed() < Duration::from_secs(4));
        assert_eq!(task.phase, DeployPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_wins_over_non_terminal_state() {
        let backend = ScriptedBackend::new(|_| {
            vec![TaskRecord::new("starting").with_error("port already allocated")]
        });
        let err = reconciler(&backend)
            .reconcile(&mut task("api:1.0.0"))
            .await
            .unwrap_err();

        assert_eq!(err.state(), Some(ServiceState::Deploying));
        assert_eq!(backend.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_error_string_is_ignored() {
        let backend = ScriptedBackend::new(|_| vec![TaskRecord::new("running").with_error("")]);
        assert!(
            reconciler(&backend)
                .reconcile(&mut task("api:1.0.0"))
                .await
                .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_newest_task_wins() {
        // Old revision failed; the new one is running
        let backend = ScriptedBackend::new(|_| {
            vec![
                TaskRecord::new("failed")
                    .with_error("exit 1")
                    .created_at(at(0)),
                TaskRecord::new("running").created_at(at(60)),
                TaskRecord::new("shutdown").created_at(at(30)),
            ]
        });

        assert!(
            reconciler(&backend)
                .reconcile(&mut task("api:1.0.1"))
                .await
                .is_ok()
        );
        assert_eq!(backend.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_service_is_updated_with_revision() {
        let backend = ScriptedBackend::new(|_| vec![TaskRecord::new("running")]).existing(
            ServiceHandle {
                id: "svc-9".to_string(),
                revision: Some(42),
            },
        );
        let mut task = task("api:2.0.0");

        reconciler(&backend).reconcile(&mut task).await.unwrap();

        assert_eq!(
            backend.calls(),
            ["find shop--api", "update svc-9 @42 api:2.0.0"]
        );
        assert_eq!(task.provider_id.as_deref(), Some("svc-9"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission() {
        let backend = ScriptedBackend::new(|_| vec![TaskRecord::new("running")]);
        let mut task = task("bad");

        let err = reconciler(&backend).reconcile(&mut task).await.unwrap_err();

        assert!(matches!(err, DeploymentError::Rejected { ref message, .. } if message == "invalid image"));
        assert_eq!(backend.polls(), 0);
        assert_eq!(task.phase, DeployPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tasks_yet_keeps_polling() {
        let backend = ScriptedBackend::new(|n| {
            if n < 4 {
                Vec::new()
            } else {
                vec![TaskRecord::new("running")]
            }
        });
        reconciler(&backend)
            .reconcile(&mut task("api:1.0.0"))
            .await
            .unwrap();
        assert_eq!(backend.polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_state_is_not_terminal() {
        let backend = ScriptedBackend::new(|n| {
            if n < 2 {
                vec![TaskRecord::new("orphaned")]
            } else {
                vec![TaskRecord::new("running")]
            }
        });
        reconciler(&backend)
            .reconcile(&mut task("api:1.0.0"))
            .await
            .unwrap();
        assert_eq!(backend.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_reconcile() {
        let backend = ScriptedBackend::new(|_| vec![TaskRecord::new("pending")]);
        let cancel = CancellationToken::new();
        let reconciler = Reconciler::new(&backend, Poller::default(), cancel.clone());
        let mut task = task("api:1.0.0");

        let (result, _) = tokio::join!(reconciler.reconcile(&mut task), async {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            cancel.cancel();
        });

        assert_eq!(
            result.unwrap_err(),
            DeploymentError::Cancelled {
                workload: "api".to_string(),
                state: ServiceState::Deploying,
            }
        );
        assert_eq!(backend.polls(), 3);
        assert_eq!(task.phase, DeployPhase::Cancelled);
    }

    #[test]
    fn test_latest_task_orders_by_creation_desc() {
        let tasks = vec![
            TaskRecord::new("a").created_at(at(10)),
            TaskRecord::new("b"),
            TaskRecord::new("c").created_at(at(20)),
        ];
        assert_eq!(latest_task(tasks).unwrap().state, "c");
        assert!(latest_task(Vec::new()).is_none());
    }
}
