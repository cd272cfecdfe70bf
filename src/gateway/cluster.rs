use crate::{
    errors::{classify_kube, ErrorClass},
    gateway::{CreateOutcome, Gateway, GatewayError, PolicyLookup, Scope, ServerVersion},
    policy::IsolationPolicy,
    workload::WorkloadSnapshot,
};
use anyhow::Context as _;
use async_trait::async_trait;
use k8s_openapi::api::{apps::v1::Deployment, networking::v1::NetworkPolicy};
use kube::{
    api::{ListParams, PostParams},
    Api,
};

/// Gateway backed by a real apiserver
#[derive(Clone)]
pub struct ClusterGateway {
    client: kube::Client,
}

impl ClusterGateway {
    pub fn new(client: kube::Client) -> Self {
        ClusterGateway { client }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some("kube-guard".to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Gateway for ClusterGateway {
    #[tracing::instrument(skip(self))]
    async fn list_workloads(&self, scope: &Scope) -> Result<Vec<WorkloadSnapshot>, GatewayError> {
        let api = match scope {
            Scope::All => Api::<Deployment>::all(self.client.clone()),
            Scope::Namespace(ns) => Api::<Deployment>::namespaced(self.client.clone(), ns),
        };
        let deployments = api
            .list(&ListParams::default())
            .await
            .context("failed to list deployments")?;
        tracing::debug!(count = deployments.items.len(), "listed deployments");
        Ok(deployments.items.iter().map(WorkloadSnapshot::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn get_policy(&self, namespace: &str, name: &str) -> Result<PolicyLookup, GatewayError> {
        let api = Api::<NetworkPolicy>::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(np) => Ok(PolicyLookup::Found(IsolationPolicy::from_network_policy(&np)?)),
            Err(err) => match classify_kube(&err) {
                ErrorClass::NotFound => Ok(PolicyLookup::NotFound),
                _ => Err(err).context("failed to get NetworkPolicy"),
            },
        }
    }

    #[tracing::instrument(skip(self, policy), fields(name = policy.name.as_str()))]
    async fn create_policy(&self, policy: &IsolationPolicy) -> Result<CreateOutcome, GatewayError> {
        let api = Api::<NetworkPolicy>::namespaced(self.client.clone(), &policy.namespace);
        let np = policy.to_network_policy()?;
        match api.create(&Self::post_params(), &np).await {
            Ok(created) => Ok(CreateOutcome::Created(IsolationPolicy::from_network_policy(
                &created,
            )?)),
            Err(err) => match classify_kube(&err) {
                ErrorClass::AlreadyExists | ErrorClass::Conflict => {
                    tracing::debug!("NetworkPolicy already exists: {}", err);
                    Ok(CreateOutcome::Conflict)
                }
                _ => Err(err).context("failed to create NetworkPolicy"),
            },
        }
    }

    async fn server_version(&self) -> Result<ServerVersion, GatewayError> {
        let info = self
            .client
            .apiserver_version()
            .await
            .context("failed to get apiserver version")?;
        Ok(ServerVersion {
            major: info.major,
            minor: info.minor,
            git_version: info.git_version,
        })
    }
}
