//! Workload spec → Docker Swarm service spec
//!
//! A `container` workload's `spec` is parsed into [`ContainerSpec`] and then
//! converted into the `ServiceSpec` the Docker API expects.

use crate::error::{Result, SwarmError};
use bollard::models::{
    EndpointPortConfig, EndpointPortConfigProtocolEnum, EndpointPortConfigPublishModeEnum,
    EndpointSpec, Mount, MountTypeEnum, ServiceSpec, ServiceSpecMode, ServiceSpecModeReplicated,
    ServiceSpecUpdateConfig, TaskSpec, TaskSpecContainerSpec,
};
use fleetdeploy_core::WorkloadConfig;
use fleetdeploy_plugin::{DeployParams, PluginContext};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const LABEL_ENVIRONMENT: &str = "environment";
pub const LABEL_NAMESPACE: &str = "namespace";
pub const LABEL_PROVIDER: &str = "provider";

/// Service name of a workload: `<project>--<workload>`
pub fn service_name(project_name: &str, workload_name: &str) -> String {
    format!("{}--{}", project_name, workload_name)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub container_port: u16,

    /// Published port; left to swarm when unset
    #[serde(default)]
    pub host_port: Option<u16>,

    #[serde(default)]
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub container_path: String,

    /// Bind mount source. Without one the volume is a tmpfs.
    #[serde(default)]
    pub host_path: Option<String>,

    #[serde(default)]
    pub read_only: bool,
}

/// Desired state of a `container` workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,

    #[serde(default)]
    pub command: Option<Vec<String>>,

    #[serde(default)]
    pub args: Option<Vec<String>>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub ports: Vec<PortSpec>,

    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,

    #[serde(default = "default_replicas")]
    pub replicas: u64,
}

fn default_replicas() -> u64 {
    1
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: None,
            args: None,
            env: BTreeMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            replicas: default_replicas(),
        }
    }

    /// Parse and check the spec of a workload
    pub fn from_workload(workload: &WorkloadConfig) -> Result<Self> {
        let invalid = |message: String| SwarmError::InvalidSpec {
            workload: workload.name.clone(),
            message,
        };

        let spec: Self =
            serde_json::from_value(workload.spec.clone()).map_err(|e| invalid(e.to_string()))?;

        if spec.image.trim().is_empty() {
            return Err(invalid("image must not be empty".to_string()));
        }
        if spec.replicas == 0 {
            return Err(invalid("replicas must be at least 1".to_string()));
        }
        for volume in &spec.volumes {
            if !volume.container_path.starts_with('/') {
                return Err(invalid(format!(
                    "volume path '{}' must be absolute",
                    volume.container_path
                )));
            }
        }

        Ok(spec)
    }

    /// Apply caller parameters: version replaces the image tag, env is merged
    pub fn with_params(mut self, params: &DeployParams) -> Self {
        if let Some(version) = &params.version {
            let (name, _) = split_image(&self.image);
            self.image = format!("{}:{}", name, version);
        }
        self.env
            .extend(params.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Build the swarm service spec
    pub fn to_service_spec(&self, ctx: &PluginContext, workload_name: &str) -> ServiceSpec {
        let mut labels = HashMap::new();
        labels.insert(LABEL_ENVIRONMENT.to_string(), ctx.environment.clone());
        labels.insert(LABEL_NAMESPACE.to_string(), ctx.namespace.clone());
        labels.insert(LABEL_PROVIDER.to_string(), ctx.provider_name().to_string());

        let env: Vec<String> = self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let mounts: Vec<Mount> = self
            .volumes
            .iter()
            .map(|volume| match &volume.host_path {
                Some(host_path) => Mount {
                    target: Some(volume.container_path.clone()),
                    source: Some(host_path.clone()),
                    typ: Some(MountTypeEnum::BIND),
                    read_only: Some(volume.read_only),
                    ..Default::default()
                },
                None => Mount {
                    target: Some(volume.container_path.clone()),
                    typ: Some(MountTypeEnum::TMPFS),
                    read_only: Some(volume.read_only),
                    ..Default::default()
                },
            })
            .collect();

        let ports: Vec<EndpointPortConfig> = self
            .ports
            .iter()
            .map(|port| EndpointPortConfig {
                protocol: Some(match port.protocol {
                    Protocol::Tcp => EndpointPortConfigProtocolEnum::TCP,
                    Protocol::Udp => EndpointPortConfigProtocolEnum::UDP,
                }),
                target_port: Some(i64::from(port.container_port)),
                published_port: port.host_port.map(i64::from),
                publish_mode: Some(EndpointPortConfigPublishModeEnum::INGRESS),
                ..Default::default()
            })
            .collect();

        ServiceSpec {
            name: Some(service_name(&ctx.project_name, workload_name)),
            labels: Some(labels.clone()),
            task_template: Some(TaskSpec {
                container_spec: Some(TaskSpecContainerSpec {
                    image: Some(self.image.clone()),
                    labels: Some(labels),
                    command: self.command.clone(),
                    args: self.args.clone(),
                    env: Some(env),
                    mounts: Some(mounts),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            mode: Some(ServiceSpecMode {
                replicated: Some(ServiceSpecModeReplicated {
                    replicas: Some(self.replicas as i64),
                }),
                ..Default::default()
            }),
            update_config: Some(ServiceSpecUpdateConfig {
                parallelism: Some(1),
                ..Default::default()
            }),
            endpoint_spec: Some(EndpointSpec {
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Split an image reference into name and tag.
///
/// A digest suffix is dropped. A colon before the last `/` belongs to a
/// registry host, not a tag.
///
/// ```
/// use fleetdeploy_swarm::spec::split_image;
///
/// assert_eq!(split_image("redis:7-alpine"), ("redis", Some("7-alpine")));
/// assert_eq!(split_image("localhost:5000/app"), ("localhost:5000/app", None));
/// ```
pub fn split_image(image: &str) -> (&str, Option<&str>) {
    let image = image.split_once('@').map_or(image, |(name, _)| name);
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, Some(tag)),
        _ => (image, None),
    }
}
