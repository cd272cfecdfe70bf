use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use tokio::sync::Semaphore;

/// Reports deployment health and isolates a namespace with a NetworkPolicy
#[derive(Parser, Debug, Clone)]
#[command(name = "kube-guard", version)]
pub struct Args {
    /// Path to kubeconfig, leave empty to infer (in-cluster or default kubeconfig)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,
    /// HTTP server listen address. A bare port listens on all interfaces.
    #[arg(long, env = "LISTEN_ADDRESS", default_value = "0.0.0.0:8081")]
    pub address: ListenAddress,
    /// Namespace for the network policy
    #[arg(long, env = "NAMESPACE", default_value = "default")]
    pub namespace: String,
    /// Label selector for pods in namespace, e.g. `app=nginx,tier=web`
    #[arg(long, env = "SELECTOR")]
    pub selector: String,
    /// Fail deployment health requests that take longer than this
    #[arg(long, env = "HEALTH_TIMEOUT_SECS")]
    pub health_timeout_secs: Option<u64>,
    /// Maximum number of deployments probed at the same time
    #[arg(long, env = "MAX_CONCURRENT_PROBES")]
    pub max_concurrent_probes: Option<usize>,
    /// Refuse to start if the existing policy selects different pods
    #[arg(long, env = "STRICT_POLICY")]
    pub strict_policy: bool,
    /// Print the policy that would be created and exit
    #[arg(long)]
    pub print_policy: bool,
}

impl Args {
    pub fn health_timeout(&self) -> Option<Duration> {
        self.health_timeout_secs.map(Duration::from_secs)
    }

    /// Checks values clap can't check by itself
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.namespace.trim().is_empty() {
            anyhow::bail!("--namespace must not be empty");
        }
        if self.selector.trim().is_empty() {
            anyhow::bail!("--selector must not be empty");
        }
        match self.max_concurrent_probes {
            Some(0) => anyhow::bail!("--max-concurrent-probes must be positive"),
            Some(limit) if limit > Semaphore::MAX_PERMITS => anyhow::bail!(
                "--max-concurrent-probes must be at most {}",
                Semaphore::MAX_PERMITS
            ),
            _ => (),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenAddress(pub SocketAddr);

impl FromStr for ListenAddress {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix(':').unwrap_or(s);
        if let Ok(port) = s.parse::<u16>() {
            return Ok(ListenAddress(SocketAddr::from(([0, 0, 0, 0], port))));
        }
        match s.parse() {
            Ok(addr) => Ok(ListenAddress(addr)),
            Err(_) => anyhow::bail!("invalid listen address '{}', expected host:port or port", s),
        }
    }
}
