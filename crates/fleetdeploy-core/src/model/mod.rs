//! Model definitions
//!
//! Providers, their environment status, and the workloads they own.

mod provider;
mod status;
mod workload;

// Re-exports
pub use provider::*;
pub use status::EnvironmentStatus;
pub use workload::*;
