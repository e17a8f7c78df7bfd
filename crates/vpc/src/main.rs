use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vpc_runtime::{
    Allocator, ClusterClient, ClusterReconciler, HttpClusterClient, IpamStore, LeaderElector,
    LinkEffector, MockCloudInventory, NodeReconciler, StandaloneLeader,
};

#[derive(Parser)]
#[command(name = "vpc", about = "Private-network NIC controller")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Paths to the shelled-out binaries the link effector drives, overridable
/// so call sites don't depend on `$PATH` contents.
#[derive(clap::Args, Clone, Debug)]
struct LinkPathArgs {
    #[arg(long, default_value = "dhclient")]
    dhclient_path: String,
    #[arg(long, default_value = "ip")]
    ip_path: String,
    #[arg(long, default_value = "iptables")]
    iptables_path: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cluster-side reconciler: materializes per-node NIC objects
    /// from PrivateNetwork declarations and drives cloud attach/detach.
    Controller {
        /// Only run the reconcile loop while holding the leader lease.
        #[arg(long, default_value_t = false)]
        enable_leader_election: bool,

        /// Address the metrics endpoint would bind to (currently unused; no
        /// metrics backend is wired up).
        #[arg(long, default_value = "0.0.0.0:9090")]
        metrics_bind_address: String,

        /// Base URL of the cluster object store.
        #[arg(long, env = "CLUSTER_STORE_URL", default_value = "http://127.0.0.1:8081")]
        cluster_store_url: String,

        /// Namespace of the ConfigMap backing the IPAM document.
        #[arg(long, env = "CONFIGMAP_NAMESPACE", default_value = "default")]
        configmap_namespace: String,

        /// Name of the ConfigMap backing the IPAM document.
        #[arg(long, env = "CONFIGMAP_NAME", default_value = "scaleway-k8s-vpc-ipam")]
        configmap_name: String,

        #[command(flatten)]
        link_paths: LinkPathArgs,
    },
    /// Run the per-node reconciler: converges the node's kernel link state
    /// with the NIC objects addressed to it.
    Node {
        /// Name of this node as registered in the cluster.
        #[arg(long, env = "NODE_NAME")]
        node_name: String,

        /// Address the metrics endpoint would bind to (currently unused; no
        /// metrics backend is wired up).
        #[arg(long, default_value = "0.0.0.0:9090")]
        metrics_bind_address: String,

        /// Base URL of the cluster object store.
        #[arg(long, env = "CLUSTER_STORE_URL", default_value = "http://127.0.0.1:8081")]
        cluster_store_url: String,

        #[command(flatten)]
        link_paths: LinkPathArgs,
    },
}

const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Controller {
            enable_leader_election,
            metrics_bind_address,
            cluster_store_url,
            configmap_namespace,
            configmap_name,
            link_paths,
        } => {
            validate_bind_address(&metrics_bind_address)?;
            run_controller(
                enable_leader_election,
                &cluster_store_url,
                &configmap_namespace,
                &configmap_name,
                &link_paths,
            )
            .await
        }
        Commands::Node {
            node_name,
            metrics_bind_address,
            cluster_store_url,
            link_paths,
        } => {
            validate_bind_address(&metrics_bind_address)?;
            run_node(&node_name, &cluster_store_url, &link_paths).await
        }
    }
}

/// The metrics bind address isn't served yet; validate its shape so a typo'd
/// flag fails fast rather than silently doing nothing.
fn validate_bind_address(addr: &str) -> miette::Result<()> {
    addr.parse::<std::net::SocketAddr>()
        .map(|_| ())
        .map_err(|e| miette::miette!("Invalid --metrics-bind-address '{}': {}", addr, e))
}

/// Wait for either SIGINT (ctrl-c) or SIGTERM, returning which one fired.
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

fn build_link_effector(paths: &LinkPathArgs) -> Arc<dyn LinkEffector> {
    #[cfg(target_os = "linux")]
    {
        info!("Using LinuxLinkEffector (ip/dhclient/iptables)");
        Arc::new(vpc_runtime::LinuxLinkEffector::new(
            paths.ip_path.clone(),
            paths.dhclient_path.clone(),
            paths.iptables_path.clone(),
        ))
    }
    #[cfg(not(target_os = "linux"))]
    {
        tracing::warn!("Non-Linux target: using MockLinkEffector, no kernel state will be touched");
        let _ = paths;
        Arc::new(vpc_runtime::MockLinkEffector::new())
    }
}

async fn run_controller(
    enable_leader_election: bool,
    cluster_store_url: &str,
    configmap_namespace: &str,
    configmap_name: &str,
    link_paths: &LinkPathArgs,
) -> miette::Result<()> {
    info!(
        "Starting cluster reconciler against store '{}' (configmap {}/{})",
        cluster_store_url, configmap_namespace, configmap_name
    );

    let cluster: Arc<dyn ClusterClient> = Arc::new(HttpClusterClient::new(cluster_store_url));

    // The concrete cloud-provider backend (its SDK and credentials) is out of
    // scope; MockCloudInventory stands in until a provider-specific adapter
    // is wired up. HttpCloudInventory exists in vpc_runtime for that purpose
    // once a base URL and auth scheme are decided.
    let cloud: Arc<dyn vpc_runtime::CloudInventory> = Arc::new(MockCloudInventory::new());

    let document_key = format!("{}/{}", configmap_namespace, configmap_name);
    let ipam_store = Arc::new(IpamStore::new(cluster.clone(), document_key));
    let allocator = Arc::new(Allocator::new(ipam_store));

    let _ = link_paths; // controller doesn't touch kernel state directly

    let elector = StandaloneLeader;
    if enable_leader_election && !elector.is_leader().await {
        return Err(miette::miette!("did not acquire leader lease on startup"));
    }
    if enable_leader_election {
        info!("Acquired leader lease (standalone elector)");
    }

    let reconciler = ClusterReconciler::new(cluster, cloud, allocator, RECONCILE_INTERVAL);

    let token = CancellationToken::new();
    let run_token = token.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = reconciler.run(run_token).await {
            error!("Cluster reconciler error: {:?}", e);
        }
    });

    let sig = shutdown_signal().await;
    info!("Received {}, shutting down gracefully...", sig);
    token.cancel();

    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    info!("Shutdown complete");

    Ok(())
}

async fn run_node(
    node_name: &str,
    cluster_store_url: &str,
    link_paths: &LinkPathArgs,
) -> miette::Result<()> {
    info!(
        "Starting node reconciler for node '{}' against store '{}'",
        node_name, cluster_store_url
    );

    let cluster: Arc<dyn ClusterClient> = Arc::new(HttpClusterClient::new(cluster_store_url));
    let link = build_link_effector(link_paths);

    let reconciler = NodeReconciler::new(cluster, link, node_name, RECONCILE_INTERVAL);

    let token = CancellationToken::new();
    let run_token = token.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = reconciler.run(run_token).await {
            error!("Node reconciler error: {:?}", e);
        }
    });

    let sig = shutdown_signal().await;
    info!("Received {}, shutting down gracefully...", sig);
    token.cancel();

    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    info!("Shutdown complete");

    Ok(())
}
