//! Access to the cluster API.
//!
//! Everything the aggregator and the provisioner need from the apiserver goes
//! through the [`Gateway`] trait. Responses the callers branch on are tagged
//! enums, so the core never inspects transport errors itself.

mod cluster;
#[cfg(test)]
pub mod memory;

pub use self::cluster::ClusterGateway;
#[cfg(test)]
pub use self::memory::MemoryGateway;

use crate::{policy::IsolationPolicy, workload::WorkloadSnapshot};
use async_trait::async_trait;

/// Any failure that is not modelled by a tagged response
pub type GatewayError = anyhow::Error;

/// Set of namespaces a listing is evaluated over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Namespace(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyLookup {
    Found(IsolationPolicy),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(IsolationPolicy),
    /// Object with the same name already exists
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerVersion {
    pub major: String,
    pub minor: String,
    pub git_version: String,
}

#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    async fn list_workloads(&self, scope: &Scope) -> Result<Vec<WorkloadSnapshot>, GatewayError>;

    async fn get_policy(&self, namespace: &str, name: &str) -> Result<PolicyLookup, GatewayError>;

    /// Creates the policy. Must be atomic with respect to the policy name.
    async fn create_policy(&self, policy: &IsolationPolicy) -> Result<CreateOutcome, GatewayError>;

    async fn server_version(&self) -> Result<ServerVersion, GatewayError>;
}
