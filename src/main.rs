//! BullyScale - Primary/Secondary Node Coordination
//!
//! Runs one node of a BullyScale cluster.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bullyscale::config::BullyScaleConfig;
use bullyscale::error::Result;
use bullyscale::state::NodeId;
use bullyscale::Node;

/// BullyScale - Primary/Secondary Node Coordination
#[derive(Parser)]
#[command(name = "bullyscale")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "bullyscale.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to the
    /// configured `logging.level`
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start {
        /// Node ID, overrides `node.id` from the configuration file
        #[arg(long)]
        id: Option<NodeId>,
    },

    /// Initialize a new configuration file for a local cluster
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "bullyscale.toml")]
        output: PathBuf,

        /// Number of nodes in the cluster
        #[arg(long, default_value_t = 3)]
        nodes: u64,

        /// Node N listens on 127.0.0.1:<base-port + N>
        #[arg(long, default_value_t = 8080)]
        base_port: u16,

        /// Node ID written to the file
        #[arg(long, default_value_t = 1)]
        node_id: NodeId,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = cli
        .log_level
        .clone()
        .or_else(|| configured_level(&cli.config))
        .unwrap_or_else(|| "info".to_string());
    init_logging(&level);

    match cli.command {
        Commands::Start { id } => run_start(cli.config, id).await,
        Commands::Init {
            output,
            nodes,
            base_port,
            node_id,
        } => run_init(output, nodes, base_port, node_id),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// `logging.level` from the configuration file, if it can be read at all
fn configured_level(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let config: BullyScaleConfig = toml::from_str(&content).ok()?;
    Some(config.logging.level)
}

/// Start the node and run until Ctrl+C or a fatal error
async fn run_start(config_path: PathBuf, id: Option<NodeId>) -> Result<()> {
    let config = BullyScaleConfig::load(&config_path, id)?;

    tracing::info!("Starting BullyScale node {}", config.node.id);
    tracing::info!("State file: {}", config.state_file().display());
    tracing::info!(
        "Cluster: {} nodes, heartbeat every {} ms, election timeout {} ms",
        config.cluster.peers.len(),
        config.timing.heartbeat_interval_ms,
        config.timing.election_timeout_ms
    );

    // A state file that cannot be loaded stops us here
    let node = Node::open(config)?;
    let listener = node.bind().await?;
    let mut handle = node.start(listener)?;

    tokio::select! {
        result = handle.wait() => {
            if let Err(e) = &result {
                tracing::error!("Node stopped: {}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
            handle.shutdown().await;
            Ok(())
        }
    }
}

/// Initialize configuration file
fn run_init(output: PathBuf, nodes: u64, base_port: u16, node_id: NodeId) -> Result<()> {
    let content = BullyScaleConfig::sample(node_id, nodes, base_port);

    // Refuse to write something we could not load back
    BullyScaleConfig::from_str(&content)?;

    std::fs::write(&output, content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nStart each node with its own ID:");
    for id in 1..=nodes {
        println!("  bullyscale --config {} start --id {}", output.display(), id);
    }

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match BullyScaleConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Listen Address: {}", config.listen_address().unwrap_or("-"));
            println!("  Peers: {}", config.cluster.peers.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = BullyScaleConfig::from_file(&config_path)?;

    println!("BullyScale Node Information");
    println!("===========================");
    println!();
    println!("Node ID:          {}", config.node.id);
    println!("Listen Address:   {}", config.listen_address().unwrap_or("-"));
    println!("State File:       {}", config.state_file().display());
    println!();
    println!("Cluster:");
    for peer in &config.cluster.peers {
        let marker = if peer.id == config.node.id { " (self)" } else { "" };
        println!("  Node {:<3}        {}{}", peer.id, peer.address, marker);
    }
    println!();
    let t = &config.timing;
    println!("Timing:");
    println!("  Startup Grace:  {} ms", t.startup_grace_ms);
    println!("  Heartbeat:      {} ms (timeout {} ms)", t.heartbeat_interval_ms, t.heartbeat_timeout_ms);
    println!("  Election:       {} ms", t.election_timeout_ms);
    println!("  Requests:       {} ms", t.request_timeout_ms);
    println!("  Sync:           after {} ms (timeout {} ms)", t.sync_delay_ms, t.sync_timeout_ms);
    println!();
    println!("Log Level:        {}", config.logging.level);

    Ok(())
}
