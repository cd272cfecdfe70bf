//! Idempotent provisioning of namespace isolation policies.
//!
//! The provisioner holds no locks: concurrent provisioners are serialized by the
//! apiserver, which refuses to create a second object with the same name. A
//! create-time conflict therefore means someone else won the race. The winner's
//! policy is read back and checked the same way as a policy found by the
//! existence check.

use crate::{
    errors::Error,
    gateway::{CreateOutcome, Gateway, PolicyLookup},
    policy::{policy_name, IsolationPolicy},
    selector::{format_label_selector, parse_label_selector},
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ProvisionOutcome {
    #[strum(serialize = "created")]
    Created,
    #[strum(serialize = "already-exists")]
    AlreadyExists,
}

/// What to do when a policy with the expected name is already present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingPolicy {
    /// Keep it as is, whatever its selector is
    #[default]
    Trust,
    /// Fail if its pod selector differs from the requested one
    Strict,
}

pub struct Provisioner {
    gateway: Arc<dyn Gateway>,
    existing: ExistingPolicy,
}

impl Provisioner {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Provisioner {
            gateway,
            existing: ExistingPolicy::Trust,
        }
    }

    pub fn with_existing_policy(mut self, existing: ExistingPolicy) -> Self {
        self.existing = existing;
        self
    }

    /// Makes sure the isolation policy for `namespace` exists.
    /// Existing policies are never modified.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_isolation_policy(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<ProvisionOutcome, Error> {
        let pod_selector = parse_label_selector(selector);
        let name = policy_name(namespace);

        let lookup = self
            .gateway
            .get_policy(namespace, &name)
            .await
            .map_err(|error| Error::ProvisioningFailed {
                name: name.clone(),
                error: error.context("failed to check for existing policy"),
            })?;
        if let PolicyLookup::Found(existing) = lookup {
            self.check_existing(&existing, &pod_selector)?;
            tracing::info!(name = name.as_str(), "Policy already exists, skipping");
            return Ok(ProvisionOutcome::AlreadyExists);
        }

        let policy = IsolationPolicy::for_namespace(namespace, pod_selector);
        tracing::info!(
            name = name.as_str(),
            pod_selector = format_label_selector(&policy.pod_selector).as_str(),
            "Creating isolation policy"
        );
        match self.gateway.create_policy(&policy).await {
            Ok(CreateOutcome::Created(_)) => Ok(ProvisionOutcome::Created),
            Ok(CreateOutcome::Conflict) => {
                tracing::info!(name = name.as_str(), "Policy was created concurrently");
                self.check_concurrent(namespace, &policy).await?;
                Ok(ProvisionOutcome::AlreadyExists)
            }
            Err(error) => {
                tracing::error!(name = name.as_str(), "Failed to create policy: {:#}", error);
                Err(Error::ProvisioningFailed { name, error })
            }
        }
    }

    /// Compares the policy that won a create race with the requested one
    async fn check_concurrent(
        &self,
        namespace: &str,
        requested: &IsolationPolicy,
    ) -> Result<(), Error> {
        let lookup = self
            .gateway
            .get_policy(namespace, &requested.name)
            .await
            .map_err(|error| Error::ProvisioningFailed {
                name: requested.name.clone(),
                error: error.context("failed to read concurrently created policy"),
            })?;
        match lookup {
            PolicyLookup::Found(existing) => {
                self.check_existing(&existing, &requested.pod_selector)
            }
            PolicyLookup::NotFound => Err(Error::ProvisioningFailed {
                name: requested.name.clone(),
                error: anyhow::anyhow!("policy was deleted right after a create conflict"),
            }),
        }
    }

    fn check_existing(
        &self,
        existing: &IsolationPolicy,
        requested: &std::collections::BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if existing.pod_selector == *requested {
            return Ok(());
        }
        match self.existing {
            ExistingPolicy::Trust => {
                tracing::warn!(
                    name = existing.name.as_str(),
                    existing = format_label_selector(&existing.pod_selector).as_str(),
                    requested = format_label_selector(requested).as_str(),
                    "Existing policy selects different pods, keeping it"
                );
                Ok(())
            }
            ExistingPolicy::Strict => Err(Error::PolicyMismatch {
                name: existing.name.clone(),
                existing: existing.pod_selector.clone(),
                requested: requested.clone(),
            }),
        }
    }
}
