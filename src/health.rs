//! Measuring health of some resources

use crate::workload::WorkloadSnapshot;
use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub trait HealthSummary {
    fn healthy(&self) -> bool;
}

pub trait Health {
    type Summary: HealthSummary;
    fn health(&self) -> Self::Summary;
}

/// Entry of the health report, one per unhealthy workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub name: String,
    pub namespace: String,
    pub desired_replicas: i32,
    pub current_replicas: i32,
    pub available_replicas: i32,
    /// Set when the workload could not be classified normally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl HealthRecord {
    /// Record for a workload whose probe failed.
    pub fn failed(snapshot: &WorkloadSnapshot, diagnostic: String) -> Self {
        HealthRecord {
            name: snapshot.name.clone(),
            namespace: snapshot.namespace.clone(),
            desired_replicas: snapshot.desired_replicas.unwrap_or(0),
            current_replicas: snapshot.current_replicas,
            available_replicas: snapshot.available_replicas,
            diagnostic: Some(diagnostic),
        }
    }
}

pub struct WorkloadSummary {
    /// all desired replicas are running and available
    pub ready: bool,
    /// Possible configuration fault found in the snapshot
    pub result: anyhow::Result<()>,
    pub record: HealthRecord,
}

impl HealthSummary for WorkloadSummary {
    fn healthy(&self) -> bool {
        self.ready && self.result.is_ok()
    }
}

impl WorkloadSummary {
    /// Returns a record if the workload is unhealthy
    pub fn into_record(self) -> Option<HealthRecord> {
        if self.healthy() {
            return None;
        }
        let mut record = self.record;
        if let Err(err) = self.result {
            record.diagnostic = Some(format!("{:#}", err));
        }
        Some(record)
    }
}

impl Health for WorkloadSnapshot {
    type Summary = WorkloadSummary;
    fn health(&self) -> WorkloadSummary {
        let desired = self
            .desired_replicas
            .context(".spec.replicas missing, treating desired replicas as 0");
        let desired_replicas = *desired.as_ref().unwrap_or(&0);
        let record = HealthRecord {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            desired_replicas,
            current_replicas: self.current_replicas,
            available_replicas: self.available_replicas,
            diagnostic: None,
        };
        WorkloadSummary {
            ready: self.current_replicas == desired_replicas
                && self.available_replicas == desired_replicas,
            result: desired.map(drop),
            record,
        }
    }
}
