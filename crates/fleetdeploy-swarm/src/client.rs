//! Docker Swarm client
//!
//! The only module that talks to the Docker API. Implements
//! [`DeploymentBackend`] so the shared reconciler can drive swarm services.

use crate::error::{Result, SwarmError};
use crate::spec::split_image;
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{Service, ServiceSpec, SwarmInitRequest, Task};
use bollard::query_parameters::{InspectServiceOptions, ListTasksOptions, UpdateServiceOptions};
use chrono::{DateTime, Utc};
use fleetdeploy_core::{EnvironmentStatus, ServiceState, WorkloadStatus};
use fleetdeploy_plugin::{
    BackendError, DeploymentBackend, ExecResult, ServiceHandle, TaskRecord, latest_task,
    map_task_state,
};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info};

const SWARM_LISTEN_ADDR: &str = "0.0.0.0:2377";
const SWARM_ADVERTISE_ADDR: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct SwarmClient {
    docker: Docker,
}

impl SwarmClient {
    /// Connect using the local defaults (`DOCKER_HOST` or the local socket)
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Swarm state of the local node. Not being in a swarm is a normal state.
    pub async fn environment_status(&self) -> Result<EnvironmentStatus> {
        match self.docker.inspect_swarm().await.map_err(SwarmError::from) {
            Ok(swarm) => {
                debug!(swarm_id = swarm.id.as_deref().unwrap_or_default(), "Swarm found");
                Ok(EnvironmentStatus::configured())
            }
            Err(e) if e.is_not_swarm_manager() => Ok(EnvironmentStatus::not_configured()),
            Err(e) => Err(e),
        }
    }

    pub async fn init_swarm(&self) -> Result<()> {
        let node_id = self
            .docker
            .init_swarm(SwarmInitRequest {
                listen_addr: Some(SWARM_LISTEN_ADDR.to_string()),
                advertise_addr: Some(SWARM_ADVERTISE_ADDR.to_string()),
                ..Default::default()
            })
            .await?;
        info!(node_id = %node_id, "Initialized swarm");
        Ok(())
    }

    async fn inspect(&self, name: &str) -> Result<Option<Service>> {
        match self
            .docker
            .inspect_service(name, None::<InspectServiceOptions>)
            .await
            .map_err(SwarmError::from)
        {
            Ok(service) => Ok(Some(service)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn tasks(&self, service_id: &str) -> Result<Vec<Task>> {
        let mut filters = HashMap::new();
        filters.insert("service".to_string(), vec![service_id.to_string()]);

        let options = ListTasksOptions {
            filters: Some(filters),
        };
        let tasks = self.docker.list_tasks(Some(options)).await?;

        // The filter also matches by name prefix
        Ok(tasks
            .into_iter()
            .filter(|task| task.service_id.as_deref() == Some(service_id))
            .collect())
    }

    /// Run a command in the newest running container of a service
    #[allow(deprecated)]
    pub async fn exec(&self, service_name: &str, command: &[String]) -> Result<ExecResult> {
        let service = self
            .inspect(service_name)
            .await?
            .ok_or_else(|| SwarmError::NoRunningContainer {
                service: service_name.to_string(),
            })?;
        let service_id = service.id.unwrap_or_default();

        let container_id = self
            .tasks(&service_id)
            .await?
            .into_iter()
            .filter(|task| task_state(task).as_deref() == Some("running"))
            .max_by_key(|task| parse_timestamp(task.created_at.as_deref()))
            .and_then(|task| task.status?.container_status?.container_id)
            .ok_or_else(|| SwarmError::NoRunningContainer {
                service: service_name.to_string(),
            })?;

        let exec_config = CreateExecOptions {
            cmd: Some(command.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let message = self.docker.create_exec(&container_id, exec_config).await?;

        let mut result = ExecResult::default();
        let start_config = StartExecOptions {
            ..Default::default()
        };
        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&message.id, Some(start_config))
            .await?
        {
            while let Some(msg) = output.next().await {
                match msg? {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        result.stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        result.stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&message.id).await?;
        result.code = inspect.exit_code.unwrap_or_default();
        Ok(result)
    }
}

#[async_trait]
impl DeploymentBackend for SwarmClient {
    type Spec = ServiceSpec;

    async fn find_service(
        &self,
        name: &str,
    ) -> std::result::Result<Option<ServiceHandle>, BackendError> {
        let service = self.inspect(name).await?;
        Ok(service.map(|service| ServiceHandle {
            id: service.id.unwrap_or_default(),
            revision: service.version.and_then(|v| v.index),
        }))
    }

    async fn create_service(&self, spec: &ServiceSpec) -> std::result::Result<String, BackendError> {
        let response = self
            .docker
            .create_service(spec.clone(), None)
            .await
            .map_err(SwarmError::from)?;
        let id = response
            .id
            .ok_or_else(|| BackendError::new("Docker did not return a service id"))?;
        info!(service_id = %id, name = spec.name.as_deref().unwrap_or_default(), "Created service");
        Ok(id)
    }

    async fn update_service(
        &self,
        handle: &ServiceHandle,
        spec: &ServiceSpec,
    ) -> std::result::Result<(), BackendError> {
        let options = UpdateServiceOptions {
            version: handle
                .revision
                .and_then(|revision| revision.try_into().ok())
                .unwrap_or_default(),
            ..Default::default()
        };
        self.docker
            .update_service(&handle.id, spec.clone(), options, None)
            .await
            .map_err(SwarmError::from)?;
        info!(service_id = %handle.id, "Updated service");
        Ok(())
    }

    async fn list_tasks(&self, service_id: &str) -> std::result::Result<Vec<TaskRecord>, BackendError> {
        let tasks = self.tasks(service_id).await?;
        Ok(tasks.iter().map(task_record).collect())
    }

    async fn describe(&self, name: &str) -> std::result::Result<WorkloadStatus, BackendError> {
        let Some(service) = self.inspect(name).await? else {
            return Ok(WorkloadStatus::missing());
        };
        let service_id = service.id.clone().unwrap_or_default();
        let tasks = self.tasks(&service_id).await?;
        Ok(workload_status(service, &tasks))
    }
}

fn task_state(task: &Task) -> Option<String> {
    task.status
        .as_ref()
        .and_then(|status| status.state)
        .map(|state| state.to_string())
        .filter(|state| !state.is_empty())
}

fn task_record(task: &Task) -> TaskRecord {
    TaskRecord {
        id: task.id.clone(),
        state: task_state(task).unwrap_or_default(),
        error: task.status.as_ref().and_then(|status| status.err.clone()),
        created_at: parse_timestamp(task.created_at.as_deref()),
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Build a status snapshot from a service and its tasks
pub(crate) fn workload_status(service: Service, tasks: &[Task]) -> WorkloadStatus {
    let latest = latest_task(tasks.iter().map(task_record).collect());
    let state = latest
        .as_ref()
        .map(|task| map_task_state(&task.state))
        .unwrap_or(ServiceState::Missing);

    let running_replicas = tasks
        .iter()
        .filter(|task| task_state(task).as_deref() == Some("running"))
        .count() as u64;

    let spec = service.spec.unwrap_or_default();
    let image = spec
        .task_template
        .and_then(|t| t.container_spec)
        .and_then(|c| c.image);
    let version = image
        .as_deref()
        .and_then(|image| split_image(image).1)
        .map(str::to_string);

    let endpoints = service
        .endpoint
        .and_then(|e| e.ports)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|port| port.published_port)
        .map(|port| format!("localhost:{}", port))
        .collect();

    WorkloadStatus {
        provider_id: service.id,
        state,
        version,
        image,
        running_replicas: Some(running_replicas),
        endpoints,
        created_at: parse_timestamp(service.created_at.as_deref()),
        updated_at: parse_timestamp(service.updated_at.as_deref()),
        last_error: latest.and_then(|task| task.error).filter(|e| !e.is_empty()),
    }
}
