//! Process entry point: bootstrap, startup provisioning and serving

use crate::{
    aggregator::{Aggregator, AggregatorConfig},
    cli::Args,
    gateway::{ClusterGateway, Gateway},
    policy::IsolationPolicy,
    provisioner::{ExistingPolicy, Provisioner},
    selector::parse_label_selector,
    server::{router, AppState},
};
use anyhow::Context as _;
use clap::Parser as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Parses command line arguments, connects to the cluster,
/// provisions the isolation policy and serves to completion.
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing::info!(args = ?args, "parsed command-line arguments");
    args.validate()?;

    if args.print_policy {
        let policy =
            IsolationPolicy::for_namespace(&args.namespace, parse_label_selector(&args.selector));
        print!("{}", policy.to_yaml()?);
        return Ok(());
    }

    let client = crate::kubeconfig::connect(args.kubeconfig.as_deref()).await?;
    let gateway: Arc<dyn Gateway> = Arc::new(ClusterGateway::new(client));
    run(args, gateway).await
}

/// Runs everything after the gateway is set up
#[tracing::instrument(skip(args, gateway))]
pub async fn run(args: Args, gateway: Arc<dyn Gateway>) -> anyhow::Result<()> {
    crate::version::check_api_server_version(&*gateway)
        .await
        .context("Kubernetes API server is unreachable")?;

    let existing = if args.strict_policy {
        ExistingPolicy::Strict
    } else {
        ExistingPolicy::Trust
    };
    let provisioner = Provisioner::new(gateway.clone()).with_existing_policy(existing);
    let outcome = provisioner
        .ensure_isolation_policy(&args.namespace, &args.selector)
        .await
        .context("failed to provision NetworkPolicy")?;
    tracing::info!(
        namespace = args.namespace.as_str(),
        selector = args.selector.as_str(),
        outcome = %outcome,
        "NetworkPolicy isolates traffic for namespace"
    );

    let shutdown = CancellationToken::new();
    tokio::task::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            tracing::info!("Shutting down");
            shutdown.cancel();
        }
    });

    let aggregator = Aggregator::new(gateway.clone()).with_config(AggregatorConfig {
        deadline: args.health_timeout(),
        max_concurrent_probes: args.max_concurrent_probes,
    });
    let state = AppState {
        aggregator: Arc::new(aggregator),
        gateway,
        shutdown: shutdown.clone(),
    };
    serve(args.address.0, state, shutdown).await
}

async fn serve(
    addr: std::net::SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("HTTP server failed")
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
                return;
            }
            Err(err) => tracing::warn!("failed to install SIGTERM handler: {}", err),
        }
    }
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
}
