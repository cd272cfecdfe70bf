//! Deployment health aggregation.
//!
//! Workloads are listed once, then every workload is probed in its own task.
//! Each task yields exactly one outcome (panics included), and the aggregator
//! waits for all of them before building the report.

use crate::{
    errors::Error,
    gateway::{Gateway, Scope},
    health::{Health, HealthRecord},
    workload::WorkloadSnapshot,
};
use async_trait::async_trait;
use futures::FutureExt as _;
use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Decides whether a single workload is healthy.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Returns `Some(record)` for unhealthy workloads.
    /// Long-running probes should stop when `cancel` fires.
    async fn probe(
        &self,
        snapshot: &WorkloadSnapshot,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<HealthRecord>>;
}

/// Classifies using the replica counts already present in the listing
pub struct StatusProbe;

#[async_trait]
impl Probe for StatusProbe {
    async fn probe(
        &self,
        snapshot: &WorkloadSnapshot,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Option<HealthRecord>> {
        Ok(snapshot.health().into_record())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthReport {
    /// Every listed workload is healthy (or nothing was listed)
    AllHealthy,
    /// Records sorted by namespace and name
    Unhealthy(Vec<HealthRecord>),
}

impl HealthReport {
    fn from_records(mut records: Vec<HealthRecord>) -> Self {
        if records.is_empty() {
            return HealthReport::AllHealthy;
        }
        records.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        HealthReport::Unhealthy(records)
    }

    pub fn records(&self) -> &[HealthRecord] {
        match self {
            HealthReport::AllHealthy => &[],
            HealthReport::Unhealthy(records) => records,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthReport::AllHealthy)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregatorConfig {
    /// Upper bound for the whole aggregation, listing included
    pub deadline: Option<Duration>,
    /// Limits number of probes running at the same time
    pub max_concurrent_probes: Option<usize>,
}

pub struct Aggregator {
    gateway: Arc<dyn Gateway>,
    probe: Arc<dyn Probe>,
    cfg: AggregatorConfig,
}

impl Aggregator {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Aggregator {
            gateway,
            probe: Arc::new(StatusProbe),
            cfg: AggregatorConfig::default(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_config(mut self, cfg: AggregatorConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Collects health of all workloads in the scope.
    /// # Errors
    /// Fails if workloads can not be listed, or if the aggregation
    /// is cancelled or runs out of time. Individual probe failures
    /// are reported as unhealthy records instead.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn aggregate(
        &self,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> Result<HealthReport, Error> {
        let cancel = cancel.child_token();
        // stops probes still running when we return early
        let _guard = cancel.clone().drop_guard();

        let work = self.collect(scope, &cancel);
        let bounded = async {
            match self.cfg.deadline {
                Some(deadline) => match tokio::time::timeout(deadline, work).await {
                    Ok(res) => res,
                    Err(_) => Err(Error::DeadlineExceeded(deadline)),
                },
                None => work.await,
            }
        };
        // workers reacting to cancellation may finish in the same poll,
        // their records must not leak into a report
        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            res = bounded => res,
        };
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        res
    }

    async fn collect(
        &self,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> Result<HealthReport, Error> {
        let workloads = self
            .gateway
            .list_workloads(scope)
            .await
            .map_err(Error::GatewayUnavailable)?;
        let expected = workloads.len();
        tracing::debug!(workloads = expected, "Probing workloads");

        let limiter = self
            .cfg
            .max_concurrent_probes
            .map(|limit| Arc::new(Semaphore::new(limit.clamp(1, Semaphore::MAX_PERMITS))));
        let mut workers = JoinSet::new();
        for snapshot in workloads {
            let probe = self.probe.clone();
            let cancel = cancel.clone();
            let limiter = limiter.clone();
            workers.spawn(
                async move {
                    let _permit = match limiter {
                        Some(limiter) => limiter.acquire_owned().await.ok(),
                        None => None,
                    };
                    run_probe(&*probe, snapshot, &cancel).await
                }
                .in_current_span(),
            );
        }

        let mut collected = 0;
        let mut records = Vec::new();
        while let Some(joined) = workers.join_next().await {
            collected += 1;
            match joined {
                Ok(Some(record)) => records.push(record),
                Ok(None) => (),
                Err(err) => {
                    // panics are caught inside the worker, so this is an abort
                    tracing::warn!("Probe task did not complete: {}", err);
                    return Err(Error::Cancelled);
                }
            }
        }
        debug_assert_eq!(collected, expected);
        tracing::info!(
            workloads = expected,
            unhealthy = records.len(),
            "Collected deployment health"
        );
        Ok(HealthReport::from_records(records))
    }
}

async fn run_probe(
    probe: &dyn Probe,
    snapshot: WorkloadSnapshot,
    cancel: &CancellationToken,
) -> Option<HealthRecord> {
    let outcome = AssertUnwindSafe(probe.probe(&snapshot, cancel))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(record)) => record,
        Ok(Err(err)) => {
            tracing::warn!(
                name = snapshot.name.as_str(),
                namespace = snapshot.namespace.as_str(),
                "Probe failed: {:#}",
                err
            );
            Some(HealthRecord::failed(
                &snapshot,
                format!("probe failed: {:#}", err),
            ))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                name = snapshot.name.as_str(),
                namespace = snapshot.namespace.as_str(),
                "Probe panicked: {}",
                message
            );
            Some(HealthRecord::failed(
                &snapshot,
                format!("probe panicked: {}", message),
            ))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return s.to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".to_string()
}
