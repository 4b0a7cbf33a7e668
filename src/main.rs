use anyhow::Context;
use clap::{Parser, Subcommand};
use fragstore::access::http::HttpConnector;
use fragstore::access::service::RecordService;
use fragstore::api::handlers::api_router;
use fragstore::directory::config::{ClusterConfig, DEFAULT_CONFIG_PATH};
use fragstore::directory::partitioner::PartitionDirectory;
use fragstore::storage::handlers::store_router;
use fragstore::storage::memory::StoreHost;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fragstore", version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve one or more partition stores.
    Node(NodeArgs),
    /// Serve the record gateway in front of the configured partitions.
    Gateway(GatewayArgs),
}

#[derive(Parser, Debug)]
struct NodeArgs {
    #[arg(long, env = "FRAGSTORE_NODE_BIND", default_value = "127.0.0.1:7100")]
    bind: SocketAddr,

    #[arg(long, env = "FRAGSTORE_NODE_USER", default_value = "root")]
    user: String,

    #[arg(long, env = "FRAGSTORE_NODE_PASSWORD", default_value = "admin")]
    password: String,

    /// Comma-separated store names, e.g. `db_cse,db_aiml`.
    #[arg(long, value_delimiter = ',', default_value = "db_cse,db_aiml")]
    stores: Vec<String>,
}

#[derive(Parser, Debug)]
struct GatewayArgs {
    #[arg(long, env = "FRAGSTORE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[arg(long, env = "FRAGSTORE_GATEWAY_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Args::parse().cmd {
        Command::Node(args) => run_node(args).await,
        Command::Gateway(args) => run_gateway(args).await,
    }
}

async fn run_node(args: NodeArgs) -> anyhow::Result<()> {
    let host = StoreHost::new(&args.user, &args.password);
    for store in args.stores.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        host.provision(store);
        tracing::info!("Provisioned store {}", store);
    }

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind store node on {}", args.bind))?;
    tracing::info!("Store node listening on {}", args.bind);

    axum::serve(listener, store_router(host)).await?;
    Ok(())
}

async fn run_gateway(args: GatewayArgs) -> anyhow::Result<()> {
    let config = ClusterConfig::load_or_init(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let directory = PartitionDirectory::from_config(&config)?;
    let connector = HttpConnector::from_config(&config)?;

    tracing::info!(
        "Routing {} partitions via {:?} binding (replication={}, timeout={}ms)",
        directory.len(),
        config.binding,
        config.replication_enabled,
        config.node_timeout_ms
    );
    for partition in directory.all_partitions() {
        if let Ok(descriptor) = directory.descriptor(&partition) {
            tracing::info!("  - {} -> {} / {}", partition, descriptor.host, descriptor.store);
        }
    }

    let service = Arc::new(RecordService::new(directory, connector));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind gateway on {}", args.bind))?;
    tracing::info!("Gateway listening on {}", args.bind);

    axum::serve(listener, api_router(service)).await?;
    Ok(())
}
