//! Orchestration run
//!
//! Resolution is a strict barrier: every provider is validated, ordered,
//! resolved and has its environment prepared before the first workload is
//! deployed. Deployment then runs one task per workload.

use crate::error::{OrchestrationError, Result};
use fleetdeploy_core::{
    ConfigValidator, ConfigurationError, DependencyGraph, DeploySettings, IdentifierValidator,
    Provider, ProviderConfig, ProviderMap, ReferenceExtractor, TemplateReferenceCollector,
    WorkloadConfig, WorkloadStatus, registry,
};
use fleetdeploy_plugin::{ActionRouter, DeployParams, ExecResult, PluginContext, WorkloadOutputs};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Providers resolved for one run, immutable once returned
#[derive(Debug)]
pub struct Resolved {
    pub graph: DependencyGraph,
    pub providers: ProviderMap,
}

impl Resolved {
    /// Provider names in dependency order
    pub fn order(&self) -> &[String] {
        self.graph.order()
    }

    pub fn provider(&self, name: &str) -> Option<&Arc<Provider>> {
        self.providers.get(name)
    }

    /// Owning provider and config of a workload
    pub fn workload(&self, name: &str) -> Option<(&Arc<Provider>, &WorkloadConfig)> {
        self.providers.values().find_map(|provider| {
            provider
                .workload_configs
                .iter()
                .find(|w| w.name == name)
                .map(|w| (provider, w))
        })
    }

    /// All workloads with their owner, in provider dependency order
    pub fn workloads(&self) -> impl Iterator<Item = (&Arc<Provider>, &WorkloadConfig)> {
        self.order()
            .iter()
            .filter_map(|name| self.providers.get(name))
            .flat_map(|provider| provider.workload_configs.iter().map(move |w| (provider, w)))
    }
}

#[derive(Debug)]
pub struct WorkloadOutcome {
    pub provider: String,
    pub result: Result<WorkloadStatus>,
}

/// Per-workload results of a deploy; one failure never hides another result
#[derive(Debug, Default)]
pub struct DeployReport {
    pub outcomes: BTreeMap<String, WorkloadOutcome>,
}

impl DeployReport {
    pub fn get(&self, workload: &str) -> Option<&WorkloadOutcome> {
        self.outcomes.get(workload)
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(|o| o.result.is_ok())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &WorkloadStatus)> {
        self.outcomes
            .iter()
            .filter_map(|(name, o)| o.result.as_ref().ok().map(|s| (name.as_str(), s)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &OrchestrationError)> {
        self.outcomes
            .iter()
            .filter_map(|(name, o)| o.result.as_ref().err().map(|e| (name.as_str(), e)))
    }
}

pub struct Orchestrator {
    settings: DeploySettings,
    router: Arc<ActionRouter>,
    validator: Box<dyn ConfigValidator>,
    extractor: Box<dyn ReferenceExtractor>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("router", &self.router)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(settings: DeploySettings, router: ActionRouter) -> Self {
        Self {
            settings,
            router: Arc::new(router),
            validator: Box::new(IdentifierValidator),
            extractor: Box::new(TemplateReferenceCollector::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_validator(mut self, validator: impl ConfigValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn with_extractor(mut self, extractor: impl ReferenceExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    pub fn router(&self) -> &ActionRouter {
        &self.router
    }

    /// Token cancelled by [`Orchestrator::cancel`]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every in-flight reconciliation at its next wait point
    pub fn cancel(&self) {
        info!("Cancelling orchestration run");
        self.cancel.cancel();
    }

    fn context(&self, provider: Arc<Provider>) -> PluginContext {
        PluginContext::new(&self.settings, provider, self.cancel.clone())
    }

    /// Validate, order and resolve providers, then prepare their environments
    /// in dependency order.
    #[instrument(
        skip_all,
        fields(project = %self.settings.project_name, environment = %self.settings.environment)
    )]
    pub async fn resolve(
        &self,
        configs: Vec<ProviderConfig>,
        workloads: Vec<WorkloadConfig>,
    ) -> Result<Resolved> {
        self.settings.validate()?;

        let mut active = Vec::with_capacity(configs.len());
        for config in configs {
            let config = self
                .validator
                .validate(config)
                .map_err(ConfigurationError::from)?;
            if config.is_enabled_in(&self.settings.environment) {
                active.push(config);
            } else {
                debug!(provider = %config.name, "Provider disabled in this environment");
            }
        }

        let declared: HashMap<String, Vec<String>> = self.router.declared_dependencies(&active)?;
        let graph = DependencyGraph::build(&active, &declared, self.extractor.as_ref())?;

        let configured: BTreeSet<String> = active.iter().map(|c| c.name.clone()).collect();
        let grouped = self.router.group_workloads(workloads, &configured)?;
        let providers = registry::resolve(&graph, &active, grouped)?;

        for name in graph.order() {
            let Some(provider) = providers.get(name) else {
                continue;
            };
            let status = self
                .router
                .prepare_environment(&self.context(provider.clone()))
                .await?;
            if !status.ready {
                warn!(provider = %name, "Environment not ready after preparation");
                return Err(OrchestrationError::EnvironmentNotReady {
                    provider: name.clone(),
                });
            }
        }

        info!(providers = graph.len(), order = ?graph.order(), "Providers resolved");
        Ok(Resolved { graph, providers })
    }

    /// Deploy every resolved workload concurrently
    #[instrument(skip_all, fields(project = %self.settings.project_name))]
    pub async fn deploy(&self, resolved: &Resolved, params: &DeployParams) -> DeployReport {
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();

        for (provider, workload) in resolved.workloads() {
            let router = self.router.clone();
            let ctx = self.context(provider.clone()).child();
            let workload = workload.clone();
            let params = params.clone();
            let key = (provider.name.clone(), workload.name.clone());

            let handle = tasks.spawn(async move {
                let result = router.deploy_workload(&ctx, &workload, &params).await;
                (ctx.provider.name.clone(), workload.name, result)
            });
            names.insert(handle.id(), key);
        }

        info!(workloads = names.len(), "Deploying workloads");

        let mut report = DeployReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((provider, workload, result)) => {
                    match &result {
                        Ok(status) => {
                            info!(workload = %workload, state = %status.state, "Workload deployed")
                        }
                        Err(e) => {
                            warn!(workload = %workload, error = %e, "Workload deployment failed")
                        }
                    }
                    report.outcomes.insert(
                        workload,
                        WorkloadOutcome {
                            provider,
                            result: result.map_err(OrchestrationError::from),
                        },
                    );
                }
                Err(e) => {
                    let Some((provider, workload)) = names.remove(&e.id()) else {
                        error!(error = %e, "Untracked deployment task failed");
                        continue;
                    };
                    error!(workload = %workload, error = %e, "Deployment task aborted");
                    report.outcomes.insert(
                        workload.clone(),
                        WorkloadOutcome {
                            provider,
                            result: Err(OrchestrationError::TaskAborted {
                                workload,
                                message: e.to_string(),
                            }),
                        },
                    );
                }
            }
        }

        report
    }

    /// Current status of a resolved workload
    pub async fn workload_status(
        &self,
        resolved: &Resolved,
        workload: &str,
    ) -> Result<WorkloadStatus> {
        let (provider, config) = lookup(resolved, workload)?;
        Ok(self
            .router
            .get_workload_status(&self.context(provider), config)
            .await?)
    }

    pub async fn exec(
        &self,
        resolved: &Resolved,
        workload: &str,
        command: &[String],
    ) -> Result<ExecResult> {
        let (provider, config) = lookup(resolved, workload)?;
        Ok(self
            .router
            .exec_in_workload(&self.context(provider), config, command)
            .await?)
    }

    pub async fn workload_outputs(
        &self,
        resolved: &Resolved,
        workload: &str,
    ) -> Result<WorkloadOutputs> {
        let (provider, config) = lookup(resolved, workload)?;
        Ok(self
            .router
            .get_workload_outputs(&self.context(provider), config)
            .await?)
    }
}

fn lookup<'a>(
    resolved: &'a Resolved,
    workload: &str,
) -> Result<(Arc<Provider>, &'a WorkloadConfig)> {
    resolved
        .workload(workload)
        .map(|(provider, config)| (provider.clone(), config))
        .ok_or_else(|| OrchestrationError::UnknownWorkload(workload.to_string()))
}
