//! In-process gateway.
//!
//! Keeps workloads and policies in memory and gives policy creation the same
//! create-with-unique-name semantics as the apiserver. Only built for tests.

use crate::{
    gateway::{CreateOutcome, Gateway, GatewayError, PolicyLookup, Scope, ServerVersion},
    policy::IsolationPolicy,
    workload::WorkloadSnapshot,
};
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};
use tokio::sync::Barrier;

#[derive(Default)]
struct State {
    workloads: Vec<WorkloadSnapshot>,
    /// Keyed by (namespace, name)
    policies: BTreeMap<(String, String), IsolationPolicy>,
}

/// Barrier that only the first `parties` missed lookups wait on
struct LookupBarrier {
    barrier: Barrier,
    slots: AtomicUsize,
}

impl LookupBarrier {
    async fn wait(&self) {
        let claimed = self
            .slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if claimed {
            self.barrier.wait().await;
        }
    }
}

#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<State>,
    version: ServerVersion,
    unreachable: AtomicBool,
    reject_creates: AtomicBool,
    create_calls: AtomicUsize,
    /// Awaited after a lookup misses, so callers can be lined up
    /// between the existence check and the create.
    lookup_barrier: Option<LookupBarrier>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workloads(workloads: Vec<WorkloadSnapshot>) -> Self {
        let gw = Self::new();
        gw.state.lock().unwrap().workloads = workloads;
        gw
    }

    pub fn with_version(mut self, major: &str, minor: &str, git_version: &str) -> Self {
        self.version = ServerVersion {
            major: major.to_string(),
            minor: minor.to_string(),
            git_version: git_version.to_string(),
        };
        self
    }

    /// Makes the first `parties` callers that miss the policy wait for each other
    /// before creating it. Later misses return immediately.
    pub fn with_lookup_barrier(mut self, parties: usize) -> Self {
        self.lookup_barrier = Some(LookupBarrier {
            barrier: Barrier::new(parties),
            slots: AtomicUsize::new(parties),
        });
        self
    }

    /// When set, every call fails as if the apiserver was down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// When set, creates fail with a non-conflict error
    pub fn set_reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    pub fn insert_policy(&self, policy: IsolationPolicy) {
        let key = (policy.namespace.clone(), policy.name.clone());
        self.state.lock().unwrap().policies.insert(key, policy);
    }

    pub fn policies(&self) -> Vec<IsolationPolicy> {
        self.state.lock().unwrap().policies.values().cloned().collect()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), GatewayError> {
        if self.unreachable.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn list_workloads(&self, scope: &Scope) -> Result<Vec<WorkloadSnapshot>, GatewayError> {
        self.check_reachable()?;
        let state = self.state.lock().unwrap();
        let workloads = state
            .workloads
            .iter()
            .filter(|w| match scope {
                Scope::All => true,
                Scope::Namespace(ns) => w.namespace == *ns,
            })
            .cloned()
            .collect();
        Ok(workloads)
    }

    async fn get_policy(&self, namespace: &str, name: &str) -> Result<PolicyLookup, GatewayError> {
        self.check_reachable()?;
        let found = {
            let state = self.state.lock().unwrap();
            state
                .policies
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
        };
        match found {
            Some(policy) => Ok(PolicyLookup::Found(policy)),
            None => {
                if let Some(barrier) = &self.lookup_barrier {
                    barrier.wait().await;
                }
                Ok(PolicyLookup::NotFound)
            }
        }
    }

    async fn create_policy(&self, policy: &IsolationPolicy) -> Result<CreateOutcome, GatewayError> {
        self.check_reachable()?;
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_creates.load(Ordering::SeqCst) {
            anyhow::bail!("admission webhook denied the request");
        }
        let key = (policy.namespace.clone(), policy.name.clone());
        let mut state = self.state.lock().unwrap();
        if state.policies.contains_key(&key) {
            return Ok(CreateOutcome::Conflict);
        }
        state.policies.insert(key, policy.clone());
        Ok(CreateOutcome::Created(policy.clone()))
    }

    async fn server_version(&self) -> Result<ServerVersion, GatewayError> {
        self.check_reachable()?;
        Ok(self.version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lookup_barrier_releases_later_callers() {
        let gateway = Arc::new(MemoryGateway::new().with_lookup_barrier(2));
        let first = tokio::spawn({
            let gateway = gateway.clone();
            async move { gateway.get_policy("prod", "isolate-prod").await }
        });
        let second = gateway.get_policy("prod", "isolate-prod").await.unwrap();
        assert_eq!(second, PolicyLookup::NotFound);
        assert_eq!(first.await.unwrap().unwrap(), PolicyLookup::NotFound);

        let later = tokio::time::timeout(
            Duration::from_secs(5),
            gateway.get_policy("prod", "isolate-prod"),
        )
        .await
        .expect("lookup after the barrier must not block");
        assert_eq!(later.unwrap(), PolicyLookup::NotFound);
    }
}
