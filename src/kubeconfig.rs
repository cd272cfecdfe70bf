use anyhow::Context as _;
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::path::Path;

/// Creates a client.
///
/// With explicit `kubeconfig` path the file is used as is (current context).
/// Otherwise configuration is inferred: `KUBECONFIG` / `~/.kube/config`, then
/// in-cluster service account.
pub async fn connect(kubeconfig: Option<&Path>) -> anyhow::Result<kube::Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("failed to load kubeconfig")?
        }
        None => kube::Config::infer()
            .await
            .context("failed to infer kubernetes configuration")?,
    };
    tracing::debug!(cluster_url = %config.cluster_url, "Loaded kubernetes configuration");
    kube::Client::try_from(config).context("failed to create kubernetes client")
}
