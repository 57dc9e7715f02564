//! Plugin capability interface
//!
//! Every backend implements [`Plugin`]. A plugin overrides only the handlers
//! it supports and lists them in [`Plugin::handlers`]; the router checks that
//! set before calling anything, so the default method bodies are only reached
//! when a plugin lists a handler it forgot to implement.

use crate::context::PluginContext;
use crate::error::{PluginError, Result};
use async_trait::async_trait;
use fleetdeploy_core::{EnvironmentStatus, WorkloadConfig, WorkloadStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The fixed set of plugin actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handler {
    GetEnvironmentStatus,
    ConfigureEnvironment,
    GetWorkloadStatus,
    DeployWorkload,
    ExecInWorkload,
    GetWorkloadOutputs,
}

impl Handler {
    pub const ALL: [Handler; 6] = [
        Handler::GetEnvironmentStatus,
        Handler::ConfigureEnvironment,
        Handler::GetWorkloadStatus,
        Handler::DeployWorkload,
        Handler::ExecInWorkload,
        Handler::GetWorkloadOutputs,
    ];

    /// Handlers a plugin must implement once it advertises a workload kind
    pub const REQUIRED_FOR_WORKLOADS: [Handler; 2] =
        [Handler::GetWorkloadStatus, Handler::DeployWorkload];

    pub fn as_str(&self) -> &'static str {
        match self {
            Handler::GetEnvironmentStatus => "get_environment_status",
            Handler::ConfigureEnvironment => "configure_environment",
            Handler::GetWorkloadStatus => "get_workload_status",
            Handler::DeployWorkload => "deploy_workload",
            Handler::ExecInWorkload => "exec_in_workload",
            Handler::GetWorkloadOutputs => "get_workload_outputs",
        }
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type HandlerSet = BTreeSet<Handler>;

/// Caller supplied deployment parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployParams {
    /// Overrides the version (image tag) in the workload spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Extra environment variables for the workload
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl DeployParams {
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Result of running a command inside a workload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// stdout followed by stderr
    pub fn output(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

pub type WorkloadOutputs = BTreeMap<String, String>;

#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name; a provider config selects its plugin by this name
    fn name(&self) -> &str;

    /// Workload kinds this plugin can deploy (e.g. "container")
    fn workload_kinds(&self) -> Vec<String> {
        Vec::new()
    }

    /// Static provider-level dependencies, in addition to template references
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Handlers this plugin implements
    fn handlers(&self) -> HandlerSet;

    async fn get_environment_status(&self, _ctx: &PluginContext) -> Result<EnvironmentStatus> {
        Err(PluginError::unsupported(self.name(), Handler::GetEnvironmentStatus))
    }

    async fn configure_environment(&self, _ctx: &PluginContext) -> Result<()> {
        Err(PluginError::unsupported(self.name(), Handler::ConfigureEnvironment))
    }

    async fn get_workload_status(
        &self,
        _ctx: &PluginContext,
        _workload: &WorkloadConfig,
    ) -> Result<WorkloadStatus> {
        Err(PluginError::unsupported(self.name(), Handler::GetWorkloadStatus))
    }

    async fn deploy_workload(
        &self,
        _ctx: &PluginContext,
        _workload: &WorkloadConfig,
        _params: &DeployParams,
    ) -> Result<WorkloadStatus> {
        Err(PluginError::unsupported(self.name(), Handler::DeployWorkload))
    }

    async fn exec_in_workload(
        &self,
        _ctx: &PluginContext,
        _workload: &WorkloadConfig,
        _command: &[String],
    ) -> Result<ExecResult> {
        Err(PluginError::unsupported(self.name(), Handler::ExecInWorkload))
    }

    async fn get_workload_outputs(
        &self,
        _ctx: &PluginContext,
        _workload: &WorkloadConfig,
    ) -> Result<WorkloadOutputs> {
        Err(PluginError::unsupported(self.name(), Handler::GetWorkloadOutputs))
    }
}
