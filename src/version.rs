use crate::gateway::{Gateway, ServerVersion};
use anyhow::Context as _;

/// Minimal apiserver minor version with `networking.k8s.io/v1` NetworkPolicy
/// supporting `policyTypes`.
const MIN_MINOR_VERSION: u32 = 8;

/// Returns GitVersion of the apiserver.
///
/// Fails if the apiserver can't be reached, which makes it useful to check connectivity.
pub async fn kubernetes_version(gateway: &dyn Gateway) -> anyhow::Result<String> {
    let version = gateway.server_version().await?;
    Ok(version.git_version)
}

/// Connects to the apiserver and reports version skew.
/// Skew is only logged; unreachable apiserver is an error.
#[tracing::instrument(skip(gateway))]
pub async fn check_api_server_version(gateway: &dyn Gateway) -> anyhow::Result<ServerVersion> {
    let apiserver_version = gateway
        .server_version()
        .await
        .context("failed to get apiserver version")?;
    tracing::info!(
        version = apiserver_version.git_version.as_str(),
        "Connected to Kubernetes"
    );

    if apiserver_version.major != "1" {
        tracing::error!(
            "Fatal version skew: apiserver major version is {}, which is not '1'",
            apiserver_version.major
        );
        return Ok(apiserver_version);
    }

    match parse_minor(&apiserver_version.minor) {
        Some(minor) if minor < MIN_MINOR_VERSION => {
            tracing::error!(
                "Dangerous version skew: apiserver {}.{} is older than 1.{}",
                apiserver_version.major,
                minor,
                MIN_MINOR_VERSION
            );
        }
        Some(minor) => {
            tracing::debug!(minor = minor, "apiserver version is supported");
        }
        None => {
            tracing::warn!(
                "failed to parse apiserver minor version {:?}",
                apiserver_version.minor
            );
        }
    }
    Ok(apiserver_version)
}

/// Parses minor versions like `27` or `27+`
fn parse_minor(minor: &str) -> Option<u32> {
    minor
        .chars()
        .take_while(|ch| ch.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    #[tokio::test]
    async fn reports_git_version() {
        let gateway = MemoryGateway::new().with_version("1", "25", "1.25.0-fake");
        assert_eq!(kubernetes_version(&gateway).await.unwrap(), "1.25.0-fake");
    }

    #[tokio::test]
    async fn empty_version_is_not_an_error() {
        let gateway = MemoryGateway::new();
        assert_eq!(kubernetes_version(&gateway).await.unwrap(), "");
        let version = check_api_server_version(&gateway).await.unwrap();
        assert_eq!(version, ServerVersion::default());
    }

    #[tokio::test]
    async fn unreachable_apiserver() {
        let gateway = MemoryGateway::new();
        gateway.set_unreachable(true);
        assert!(kubernetes_version(&gateway).await.is_err());
        assert!(check_api_server_version(&gateway).await.is_err());
    }

    #[test]
    fn minor_versions() {
        assert_eq!(parse_minor("27"), Some(27));
        assert_eq!(parse_minor("27+"), Some(27));
        assert_eq!(parse_minor(""), None);
    }
}
