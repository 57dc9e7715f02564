//! Action dispatch
//!
//! [`ActionRouter`] owns the registered plugins and routes every generic
//! orchestration call to the plugin behind a provider. Calls are checked
//! against the plugin's [`HandlerSet`] first; an unimplemented optional
//! handler yields a typed "unsupported" result or a neutral default.

use crate::context::PluginContext;
use crate::error::{PluginError, Result};
use crate::plugin::{DeployParams, ExecResult, Handler, HandlerSet, Plugin, WorkloadOutputs};
use fleetdeploy_core::{
    ConfigurationError, EnvironmentStatus, ProviderConfig, WorkloadConfig, WorkloadStatus,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument};

struct Registration {
    plugin: Arc<dyn Plugin>,
    handlers: HandlerSet,
    workload_kinds: BTreeSet<String>,
}

#[derive(Default)]
pub struct ActionRouter {
    plugins: BTreeMap<String, Registration>,
}

impl std::fmt::Debug for ActionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRouter")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ActionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its name.
    ///
    /// A plugin that advertises workload kinds must implement the status and
    /// deploy handlers.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(PluginError::DuplicatePlugin(name));
        }

        let handlers = plugin.handlers();
        let workload_kinds: BTreeSet<String> = plugin.workload_kinds().into_iter().collect();

        if !workload_kinds.is_empty() {
            for handler in Handler::REQUIRED_FOR_WORKLOADS {
                if !handlers.contains(&handler) {
                    return Err(PluginError::MissingHandler {
                        plugin: name,
                        handler,
                    });
                }
            }
        }

        info!(plugin = %name, handlers = ?handlers, kinds = ?workload_kinds, "Registered plugin");
        self.plugins.insert(
            name,
            Registration {
                plugin,
                handlers,
                workload_kinds,
            },
        );
        Ok(())
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Result<Self> {
        self.register(plugin)?;
        Ok(self)
    }

    pub fn plugin(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.get(name).map(|r| &r.plugin)
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn supports(&self, plugin: &str, handler: Handler) -> bool {
        self.plugins
            .get(plugin)
            .is_some_and(|r| r.handlers.contains(&handler))
    }

    /// Static dependencies declared by the plugin of each config
    pub fn declared_dependencies(
        &self,
        configs: &[ProviderConfig],
    ) -> std::result::Result<HashMap<String, Vec<String>>, ConfigurationError> {
        configs
            .iter()
            .map(|config| {
                let registration = self
                    .plugins
                    .get(&config.name)
                    .ok_or_else(|| ConfigurationError::UnknownPlugin(config.name.clone()))?;
                Ok((config.name.clone(), registration.plugin.dependencies()))
            })
            .collect()
    }

    /// Provider that owns `workload` among the `configured` provider names.
    ///
    /// An explicit `provider` on the workload wins, as long as its plugin
    /// advertises the workload's kind; otherwise exactly one configured
    /// provider must advertise it.
    pub fn resolve_owner(
        &self,
        workload: &WorkloadConfig,
        configured: &BTreeSet<String>,
    ) -> std::result::Result<String, ConfigurationError> {
        if let Some(provider) = &workload.provider {
            // Unconfigured owners are reported by the registry
            let mismatch = configured.contains(provider)
                && !self
                    .plugins
                    .get(provider)
                    .is_some_and(|r| r.workload_kinds.contains(&workload.kind));
            if mismatch {
                return Err(ConfigurationError::WorkloadKindMismatch {
                    workload: workload.name.clone(),
                    kind: workload.kind.clone(),
                    provider: provider.clone(),
                });
            }
            return Ok(provider.clone());
        }

        let mut candidates: Vec<String> = configured
            .iter()
            .filter(|name| {
                self.plugins
                    .get(name.as_str())
                    .is_some_and(|r| r.workload_kinds.contains(&workload.kind))
            })
            .cloned()
            .collect();

        match candidates.len() {
            0 => Err(ConfigurationError::UnknownWorkloadOwner {
                workload: workload.name.clone(),
                kind: workload.kind.clone(),
            }),
            1 => Ok(candidates.swap_remove(0)),
            _ => Err(ConfigurationError::AmbiguousWorkloadOwner {
                workload: workload.name.clone(),
                kind: workload.kind.clone(),
                candidates,
            }),
        }
    }

    /// Group workloads by owning provider. Workload names must be unique.
    pub fn group_workloads(
        &self,
        workloads: Vec<WorkloadConfig>,
        configured: &BTreeSet<String>,
    ) -> std::result::Result<BTreeMap<String, Vec<WorkloadConfig>>, ConfigurationError> {
        let mut seen = BTreeSet::new();
        let mut grouped: BTreeMap<String, Vec<WorkloadConfig>> = BTreeMap::new();
        for workload in workloads {
            if !seen.insert(workload.name.clone()) {
                return Err(ConfigurationError::DuplicateWorkload(workload.name));
            }
            let owner = self.resolve_owner(&workload, configured)?;
            debug!(workload = %workload.name, provider = %owner, "Resolved workload owner");
            grouped.entry(owner).or_default().push(workload);
        }
        Ok(grouped)
    }

    /// Look up the plugin for the context's provider if it implements `handler`
    fn handler_for(&self, ctx: &PluginContext, handler: Handler) -> Option<&Arc<dyn Plugin>> {
        self.plugins
            .get(ctx.provider_name())
            .filter(|r| r.handlers.contains(&handler))
            .map(|r| &r.plugin)
    }

    fn require(&self, ctx: &PluginContext, handler: Handler) -> Result<&Arc<dyn Plugin>> {
        self.handler_for(ctx, handler)
            .ok_or_else(|| PluginError::unsupported(ctx.provider_name(), handler))
    }

    /// Environment status; providers without the handler are always ready
    #[instrument(skip_all, fields(provider = %ctx.provider_name()))]
    pub async fn get_environment_status(&self, ctx: &PluginContext) -> Result<EnvironmentStatus> {
        match self.handler_for(ctx, Handler::GetEnvironmentStatus) {
            Some(plugin) => plugin.get_environment_status(ctx).await,
            None => Ok(EnvironmentStatus::ready()),
        }
    }

    #[instrument(skip_all, fields(provider = %ctx.provider_name()))]
    pub async fn configure_environment(&self, ctx: &PluginContext) -> Result<()> {
        self.require(ctx, Handler::ConfigureEnvironment)?
            .configure_environment(ctx)
            .await
    }

    /// Check the environment and configure it only when the plugin reports
    /// `configured == false`. The provider's status record is replaced with
    /// the final reading.
    #[instrument(skip_all, fields(provider = %ctx.provider_name()))]
    pub async fn prepare_environment(&self, ctx: &PluginContext) -> Result<Arc<EnvironmentStatus>> {
        let mut status = self.get_environment_status(ctx).await?;

        if status.needs_configure() {
            info!("Environment not configured, configuring");
            self.configure_environment(ctx).await?;
            status = self.get_environment_status(ctx).await?;
        }

        debug!(ready = status.ready, outputs = status.outputs.len(), "Environment status");
        ctx.provider.set_status(status);
        Ok(ctx.provider.status())
    }

    #[instrument(skip_all, fields(provider = %ctx.provider_name(), workload = %workload.name))]
    pub async fn get_workload_status(
        &self,
        ctx: &PluginContext,
        workload: &WorkloadConfig,
    ) -> Result<WorkloadStatus> {
        self.require(ctx, Handler::GetWorkloadStatus)?
            .get_workload_status(ctx, workload)
            .await
    }

    #[instrument(skip_all, fields(provider = %ctx.provider_name(), workload = %workload.name))]
    pub async fn deploy_workload(
        &self,
        ctx: &PluginContext,
        workload: &WorkloadConfig,
        params: &DeployParams,
    ) -> Result<WorkloadStatus> {
        self.require(ctx, Handler::DeployWorkload)?
            .deploy_workload(ctx, workload, params)
            .await
    }

    #[instrument(skip_all, fields(provider = %ctx.provider_name(), workload = %workload.name))]
    pub async fn exec_in_workload(
        &self,
        ctx: &PluginContext,
        workload: &WorkloadConfig,
        command: &[String],
    ) -> Result<ExecResult> {
        self.require(ctx, Handler::ExecInWorkload)?
            .exec_in_workload(ctx, workload, command)
            .await
    }

    /// Workload outputs; providers without the handler have none
    #[instrument(skip_all, fields(provider = %ctx.provider_name(), workload = %workload.name))]
    pub async fn get_workload_outputs(
        &self,
        ctx: &PluginContext,
        workload: &WorkloadConfig,
    ) -> Result<WorkloadOutputs> {
        match self.handler_for(ctx, Handler::GetWorkloadOutputs) {
            Some(plugin) => plugin.get_workload_outputs(ctx, workload).await,
            None => Ok(WorkloadOutputs::new()),
        }
    }
}
