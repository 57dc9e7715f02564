//! Context handed to every plugin call

use crate::poll::Poller;
use fleetdeploy_core::{DeploySettings, PollSettings, Provider, ProviderConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Project/environment identity plus the provider being acted on
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub project_name: String,
    pub environment: String,
    pub namespace: String,
    pub provider: Arc<Provider>,
    pub poll: PollSettings,

    /// Fires when the run is cancelled
    pub cancel: CancellationToken,
}

impl PluginContext {
    pub fn new(settings: &DeploySettings, provider: Arc<Provider>, cancel: CancellationToken) -> Self {
        Self {
            project_name: settings.project_name.clone(),
            environment: settings.environment.clone(),
            namespace: settings
                .namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            provider,
            poll: settings.poller(),
            cancel,
        }
    }

    /// Same identity with a child cancellation token, for one workload task
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider.name
    }

    pub fn provider_config(&self) -> &ProviderConfig {
        &self.provider.config
    }

    pub fn poller(&self) -> Poller {
        Poller::new(self.poll)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
