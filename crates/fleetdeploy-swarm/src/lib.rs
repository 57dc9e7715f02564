//! FleetDeploy Local Docker Swarm
//!
//! Deploys `container` workloads as replicated services on a single-node
//! swarm. Service names are `<project>--<workload>`; the shared reconciler
//! drives each rollout through [`client::SwarmClient`].

pub mod client;
pub mod error;
pub mod plugin;
pub mod spec;

pub use client::SwarmClient;
pub use error::{Result, SwarmError};
pub use plugin::{CONTAINER_KIND, OUTPUT_HOST, PLUGIN_NAME, SwarmPlugin};
pub use spec::{ContainerSpec, PortSpec, Protocol, VolumeSpec, service_name, split_image};
