//! Namespace isolation policy

use anyhow::Context as _;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::api::ResourceExt;
use std::collections::BTreeMap;

/// Returns name of the isolation policy for the namespace
pub fn policy_name(namespace: &str) -> String {
    format!("isolate-{}", namespace)
}

/// Ingress-only policy that admits traffic from any pod to the selected pods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationPolicy {
    pub name: String,
    pub namespace: String,
    /// Pods the policy applies to
    pub pod_selector: BTreeMap<String, String>,
}

impl IsolationPolicy {
    pub fn for_namespace(namespace: &str, pod_selector: BTreeMap<String, String>) -> Self {
        IsolationPolicy {
            name: policy_name(namespace),
            namespace: namespace.to_string(),
            pod_selector,
        }
    }

    /// Builds the NetworkPolicy object
    pub fn to_network_policy(&self) -> anyhow::Result<NetworkPolicy> {
        let repr = serde_json::json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
            },
            "spec": {
                "podSelector": {
                    "matchLabels": self.pod_selector,
                },
                "policyTypes": ["Ingress"],
                "ingress": [
                    {
                        "from": [
                            { "podSelector": {} }
                        ]
                    }
                ]
            }
        });
        serde_json::from_value(repr).context("failed to build NetworkPolicy")
    }

    /// Reads an existing NetworkPolicy. Only the pod selector is kept,
    /// the rules are not inspected.
    pub fn from_network_policy(np: &NetworkPolicy) -> anyhow::Result<Self> {
        let repr = serde_json::to_value(np).context("failed to serialize NetworkPolicy")?;
        let pod_selector = match repr.pointer("/spec/podSelector/matchLabels") {
            Some(labels) => serde_json::from_value(labels.clone())
                .context("invalid .spec.podSelector.matchLabels")?,
            None => BTreeMap::new(),
        };
        Ok(IsolationPolicy {
            name: np.name_any(),
            namespace: np.namespace().unwrap_or_default(),
            pod_selector,
        })
    }

    /// Renders the NetworkPolicy as YAML
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        let np = self.to_network_policy()?;
        serde_yaml::to_string(&np).context("failed to serialize NetworkPolicy as YAML")
    }
}
