use async_trait::async_trait;
use fleetdeploy::fleetdeploy_core::{
    DeploySettings, EnvironmentStatus, ProviderConfig, ServiceState, WorkloadConfig,
    WorkloadStatus,
};
use fleetdeploy::fleetdeploy_plugin::{
    ActionRouter, BackendError, DeployParams, DeploymentBackend, DeploymentTask, Handler,
    HandlerSet, Plugin, PluginContext, Reconciler, Result, ServiceHandle, TaskRecord,
};
use fleetdeploy::Orchestrator;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Shared, ordered log of backend-visible calls
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

/// How a workload's tasks progress, read from its spec
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Poll at which the task reports `running`; never when unset
    pub ready_after: Option<u32>,
    /// Poll at which the task reports a failure
    pub fail_at: Option<u32>,
    pub error: String,
}

impl Script {
    fn from_spec(spec: &Value) -> Self {
        let poll = |key: &str| spec.get(key).and_then(Value::as_u64).map(|n| n as u32);
        Self {
            ready_after: poll("ready_after"),
            fail_at: poll("fail_at"),
            error: spec
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("task failed")
                .to_string(),
        }
    }
}

#[derive(Debug)]
struct Service {
    id: String,
    revision: u64,
    script: Script,
    polls: u32,
}

/// In-memory backend driven through the shared reconciler
#[derive(Debug, Default)]
pub struct MemoryBackend {
    services: Mutex<HashMap<String, Service>>,
    log: EventLog,
}

pub struct MemorySpec {
    pub name: String,
    pub script: Script,
}

impl MemoryBackend {
    fn state(service: &Service) -> (&'static str, Option<String>) {
        let script = &service.script;
        if script.fail_at.is_some_and(|n| service.polls >= n) {
            ("failed", Some(script.error.clone()))
        } else if script.ready_after.is_some_and(|n| service.polls >= n) {
            ("running", None)
        } else {
            ("preparing", None)
        }
    }
}

#[async_trait]
impl DeploymentBackend for MemoryBackend {
    type Spec = MemorySpec;

    async fn find_service(
        &self,
        name: &str,
    ) -> std::result::Result<Option<ServiceHandle>, BackendError> {
        let services = self.services.lock().unwrap();
        Ok(services.get(name).map(|s| ServiceHandle {
            id: s.id.clone(),
            revision: Some(s.revision),
        }))
    }

    async fn create_service(&self, spec: &MemorySpec) -> std::result::Result<String, BackendError> {
        let mut services = self.services.lock().unwrap();
        let id = format!("svc-{}", services.len() + 1);
        self.log.push(format!("create {}", spec.name));
        services.insert(
            spec.name.clone(),
            Service {
                id: id.clone(),
                revision: 1,
                script: spec.script.clone(),
                polls: 0,
            },
        );
        Ok(id)
    }

    async fn update_service(
        &self,
        handle: &ServiceHandle,
        spec: &MemorySpec,
    ) -> std::result::Result<(), BackendError> {
        let mut services = self.services.lock().unwrap();
        let service = services
            .get_mut(&spec.name)
            .ok_or_else(|| BackendError::with_status(404, "no such service"))?;
        self.log.push(format!(
            "update {} @{}",
            spec.name,
            handle.revision.unwrap_or_default()
        ));
        service.revision += 1;
        service.script = spec.script.clone();
        service.polls = 0;
        Ok(())
    }

    async fn list_tasks(
        &self,
        service_id: &str,
    ) -> std::result::Result<Vec<TaskRecord>, BackendError> {
        let mut services = self.services.lock().unwrap();
        let Some(service) = services.values_mut().find(|s| s.id == service_id) else {
            return Ok(Vec::new());
        };
        service.polls += 1;
        let (state, error) = Self::state(service);
        let mut task = TaskRecord::new(state);
        if let Some(error) = error {
            task = task.with_error(error);
        }
        Ok(vec![task])
    }

    async fn describe(&self, name: &str) -> std::result::Result<WorkloadStatus, BackendError> {
        let services = self.services.lock().unwrap();
        let Some(service) = services.get(name) else {
            return Ok(WorkloadStatus::missing());
        };
        let (state, error) = Self::state(service);
        let state = self.map_state(state);
        Ok(WorkloadStatus {
            provider_id: Some(service.id.clone()),
            state,
            version: Some(service.revision.to_string()),
            running_replicas: Some(u64::from(state == ServiceState::Ready)),
            last_error: error,
            ..Default::default()
        })
    }
}

/// Provider plugin backed by [`MemoryBackend`]
pub struct MemoryPlugin {
    name: String,
    kinds: Vec<String>,
    dependencies: Vec<String>,
    configured: AtomicBool,
    pub configure_calls: AtomicU32,
    pub backend: MemoryBackend,
    log: EventLog,
}

impl MemoryPlugin {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            kinds: Vec::new(),
            dependencies: Vec::new(),
            configured: AtomicBool::new(true),
            configure_calls: AtomicU32::new(0),
            backend: MemoryBackend {
                services: Mutex::default(),
                log: log.clone(),
            },
            log: log.clone(),
        }
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kinds.push(kind.to_string());
        self
    }

    #[allow(dead_code)]
    pub fn with_dependency(mut self, dependency: &str) -> Self {
        self.dependencies.push(dependency.to_string());
        self
    }

    #[allow(dead_code)]
    pub fn unconfigured(self) -> Self {
        self.configured.store(false, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl Plugin for MemoryPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn workload_kinds(&self) -> Vec<String> {
        self.kinds.clone()
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn handlers(&self) -> HandlerSet {
        [
            Handler::GetEnvironmentStatus,
            Handler::ConfigureEnvironment,
            Handler::GetWorkloadStatus,
            Handler::DeployWorkload,
        ]
        .into()
    }

    async fn get_environment_status(&self, ctx: &PluginContext) -> Result<EnvironmentStatus> {
        self.log.push(format!("status {}", ctx.provider_name()));
        if self.configured.load(Ordering::SeqCst) {
            Ok(EnvironmentStatus::configured()
                .with_outputs([("name".to_string(), json!(self.name))].into()))
        } else {
            Ok(EnvironmentStatus::not_configured())
        }
    }

    async fn configure_environment(&self, ctx: &PluginContext) -> Result<()> {
        self.log.push(format!("configure {}", ctx.provider_name()));
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        self.configured.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get_workload_status(
        &self,
        ctx: &PluginContext,
        workload: &WorkloadConfig,
    ) -> Result<WorkloadStatus> {
        self.backend
            .describe(&format!("{}--{}", ctx.project_name, workload.name))
            .await
            .map_err(|e| fleetdeploy::fleetdeploy_plugin::PluginError::backend(&self.name, e))
    }

    async fn deploy_workload(
        &self,
        ctx: &PluginContext,
        workload: &WorkloadConfig,
        _params: &DeployParams,
    ) -> Result<WorkloadStatus> {
        let name = format!("{}--{}", ctx.project_name, workload.name);
        let spec = MemorySpec {
            name: name.clone(),
            script: Script::from_spec(&workload.spec),
        };
        let mut task = DeploymentTask::new(&workload.name, name, spec);
        let reconciler = Reconciler::new(&self.backend, ctx.poller(), ctx.cancel.clone());
        Ok(reconciler.reconcile(&mut task).await?)
    }
}

pub fn settings() -> DeploySettings {
    DeploySettings::new("shop", "local")
}

pub fn router(plugins: Vec<Arc<MemoryPlugin>>) -> ActionRouter {
    let mut router = ActionRouter::new();
    for plugin in plugins {
        router.register(plugin).unwrap();
    }
    router
}

pub fn orchestrator(plugins: Vec<Arc<MemoryPlugin>>) -> Orchestrator {
    Orchestrator::new(settings(), router(plugins))
}

#[allow(dead_code)]
pub fn provider(name: &str) -> ProviderConfig {
    ProviderConfig::new(name)
}

#[allow(dead_code)]
pub fn container(name: &str, spec: Value) -> WorkloadConfig {
    WorkloadConfig::new(name, "container").with_spec(spec)
}
