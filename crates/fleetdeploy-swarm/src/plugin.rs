//! Local Docker Swarm plugin

use crate::client::SwarmClient;
use crate::error::Result as SwarmResult;
use crate::spec::{ContainerSpec, service_name};
use async_trait::async_trait;
use fleetdeploy_core::{EnvironmentStatus, WorkloadConfig, WorkloadStatus};
use fleetdeploy_plugin::{
    DeployParams, DeploymentBackend, DeploymentTask, ExecResult, Handler, HandlerSet, Plugin,
    PluginContext, PluginError, Reconciler, Result, WorkloadOutputs,
};
use tracing::{debug, info, instrument};

pub const PLUGIN_NAME: &str = "local-docker-swarm";

/// Workload kind deployed as a swarm service
pub const CONTAINER_KIND: &str = "container";

/// Output key holding the in-swarm hostname of a workload
pub const OUTPUT_HOST: &str = "host";

#[derive(Debug, Clone)]
pub struct SwarmPlugin {
    client: SwarmClient,
}

impl SwarmPlugin {
    pub fn new(client: SwarmClient) -> Self {
        Self { client }
    }

    /// Plugin backed by the local Docker daemon
    pub fn connect() -> SwarmResult<Self> {
        Ok(Self::new(SwarmClient::connect()?))
    }

    pub fn client(&self) -> &SwarmClient {
        &self.client
    }
}

fn workload_outputs(ctx: &PluginContext, workload: &WorkloadConfig) -> WorkloadOutputs {
    WorkloadOutputs::from([(
        OUTPUT_HOST.to_string(),
        service_name(&ctx.project_name, &workload.name),
    )])
}

#[async_trait]
impl Plugin for SwarmPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn workload_kinds(&self) -> Vec<String> {
        vec![CONTAINER_KIND.to_string()]
    }

    fn handlers(&self) -> HandlerSet {
        Handler::ALL.into_iter().collect()
    }

    async fn get_environment_status(&self, _ctx: &PluginContext) -> Result<EnvironmentStatus> {
        Ok(self.client.environment_status().await?)
    }

    #[instrument(skip_all, fields(provider = %ctx.provider_name()))]
    async fn configure_environment(&self, ctx: &PluginContext) -> Result<()> {
        let status = self.client.environment_status().await?;
        if !status.needs_configure() {
            debug!("Swarm already initialized");
            return Ok(());
        }
        info!("Initializing swarm");
        self.client.init_swarm().await?;
        Ok(())
    }

    async fn get_workload_status(
        &self,
        ctx: &PluginContext,
        workload: &WorkloadConfig,
    ) -> Result<WorkloadStatus> {
        let name = service_name(&ctx.project_name, &workload.name);
        self.client
            .describe(&name)
            .await
            .map_err(|e| PluginError::backend(PLUGIN_NAME, e))
    }

    #[instrument(skip_all, fields(workload = %workload.name))]
    async fn deploy_workload(
        &self,
        ctx: &PluginContext,
        workload: &WorkloadConfig,
        params: &DeployParams,
    ) -> Result<WorkloadStatus> {
        let spec = ContainerSpec::from_workload(workload)?.with_params(params);
        let name = service_name(&ctx.project_name, &workload.name);
        info!(service = %name, image = %spec.image, "Deploying workload");

        let mut task =
            DeploymentTask::new(&workload.name, name, spec.to_service_spec(ctx, &workload.name));
        let reconciler = Reconciler::new(&self.client, ctx.poller(), ctx.cancel.clone());
        let status = reconciler.reconcile(&mut task).await?;

        info!(polls = task.polls, elapsed = ?task.elapsed(), "Workload ready");
        Ok(status)
    }

    async fn exec_in_workload(
        &self,
        ctx: &PluginContext,
        workload: &WorkloadConfig,
        command: &[String],
    ) -> Result<ExecResult> {
        let status = self.get_workload_status(ctx, workload).await?;
        if !status.state.is_ready() {
            return Err(PluginError::WorkloadNotReady {
                workload: workload.name.clone(),
                state: status.state,
            });
        }

        let name = service_name(&ctx.project_name, &workload.name);
        Ok(self.client.exec(&name, command).await?)
    }

    async fn get_workload_outputs(
        &self,
        ctx: &PluginContext,
        workload: &WorkloadConfig,
    ) -> Result<WorkloadOutputs> {
        Ok(workload_outputs(ctx, workload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdeploy_core::{DeploySettings, Provider, ProviderConfig};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn context() -> PluginContext {
        let settings = DeploySettings::new("shop", "local");
        let provider = Arc::new(Provider::from_config(
            ProviderConfig::new(PLUGIN_NAME),
            Vec::new(),
            Vec::new(),
            EnvironmentStatus::configured(),
        ));
        PluginContext::new(&settings, provider, CancellationToken::new())
    }

    #[test]
    fn test_outputs_expose_service_host() {
        let outputs = workload_outputs(&context(), &WorkloadConfig::new("api", CONTAINER_KIND));
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[OUTPUT_HOST], "shop--api");
    }
}
