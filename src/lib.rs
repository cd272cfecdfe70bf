//! Deployment health reporting and namespace isolation for Kubernetes clusters.

pub mod aggregator;
pub mod app;
pub mod cli;
pub mod errors;
pub mod gateway;
pub mod health;
pub mod kubeconfig;
pub mod policy;
pub mod provisioner;
pub mod selector;
pub mod server;
pub mod version;
pub mod workload;

pub use aggregator::{Aggregator, HealthReport};
pub use errors::Error;
pub use provisioner::{ProvisionOutcome, Provisioner};
