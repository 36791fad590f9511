//! Storage group binary
//!
//! Starts an entire replication group in one process: N data nodes joined
//! to a shared group channel, each with its own RocksDB store, blob area
//! and HTTP listener on consecutive ports.

use clap::{Parser, Subcommand};
use replifs::cluster::Cluster;
use replifs::node::create_router;
use replifs::{Config, DataNode};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "replifs-node")]
#[command(about = "replicated file store node group")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a replication group
    Serve {
        /// Number of group members (default from config: 3)
        #[arg(long)]
        nodes: Option<usize>,

        /// Host the HTTP listeners bind on (default from config: 127.0.0.1)
        #[arg(long)]
        bind: Option<String>,

        /// First HTTP port; member i listens on base-port + i (default from config: 7000)
        #[arg(long)]
        base_port: Option<u16>,

        /// Root data directory; each member gets a subdirectory
        #[arg(long)]
        data: Option<PathBuf>,

        /// Group name (default from config: data-cluster)
        #[arg(long)]
        group: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting {}", replifs::BUILD_INFO);

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            nodes,
            bind,
            base_port,
            data,
            group,
        } => {
            // Load config from file, then override with any CLI arguments
            // that were actually given.
            let mut config = Config::load();
            if let Some(nodes) = nodes {
                config.group.nodes = nodes;
            }
            if let Some(bind) = bind {
                config.group.bind_host = bind;
            }
            if let Some(base_port) = base_port {
                config.group.base_port = base_port;
            }
            if let Some(data) = data {
                config.node.data_dir = data;
            }
            if let Some(group) = group {
                config.group.name = group;
            }

            serve(config).await?;
        }
    }

    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let cluster = Cluster::new(&config.group.name);
    let mut members: Vec<DataNode> = Vec::with_capacity(config.group.nodes);

    for i in 0..config.group.nodes {
        let node_id = format!("node-{}", i + 1);
        let port = config.group.member_port(i)?;
        let endpoint = format!("http://{}:{}", config.group.bind_host, port);

        let mut node_config = config.node.clone();
        node_config.data_dir = config.node.data_dir.join(&node_id);

        let node = DataNode::start(&cluster, &node_id, &endpoint, node_config).await?;

        let addr = format!("{}:{}", config.group.bind_host, port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Node {} serving HTTP on {}", node.node_id(), addr);

        let router = create_router(node.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });

        members.push(node);
    }

    tracing::info!(
        "Group '{}' up with {} members, coordinator {:?}",
        config.group.name,
        members.len(),
        cluster.current_view().coordinator()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down group");
    for node in members.iter().rev() {
        node.shutdown();
    }

    Ok(())
}
