//! Point-in-time view of a workload

use k8s_openapi::api::apps::v1::Deployment;
use kube::api::ResourceExt;

/// Replica counts of one deployment, as reported by the apiserver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSnapshot {
    pub name: String,
    pub namespace: String,
    /// `.spec.replicas`; `None` if the field is unset
    pub desired_replicas: Option<i32>,
    pub current_replicas: i32,
    pub available_replicas: i32,
}

impl WorkloadSnapshot {
    pub fn new(name: &str, namespace: &str, desired: i32, current: i32, available: i32) -> Self {
        WorkloadSnapshot {
            name: name.to_string(),
            namespace: namespace.to_string(),
            desired_replicas: Some(desired),
            current_replicas: current,
            available_replicas: available,
        }
    }
}

impl From<&Deployment> for WorkloadSnapshot {
    fn from(deployment: &Deployment) -> Self {
        let status = deployment.status.as_ref();
        WorkloadSnapshot {
            name: deployment.name_any(),
            namespace: deployment.namespace().unwrap_or_default(),
            desired_replicas: deployment.spec.as_ref().and_then(|spec| spec.replicas),
            current_replicas: status.and_then(|s| s.replicas).unwrap_or(0),
            available_replicas: status.and_then(|s| s.available_replicas).unwrap_or(0),
        }
    }
}
