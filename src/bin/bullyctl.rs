//! BullyCtl - Command line tool for BullyScale clusters
//!
//! Usage:
//!   bullyctl status           - Show node status
//!   bullyctl cluster          - Show every node of the configured cluster
//!   bullyctl submit <value>   - Submit an event to the primary
//!   bullyctl state            - Dump the primary's replicated state
//!   bullyctl ping             - Heartbeat a node

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use bullyscale::config::BullyScaleConfig;
use bullyscale::replication::protocol::{
    peer_url, ErrorResponse, EventRequest, EventResponse, StatusResponse, EVENT_PATH,
    HEARTBEAT_PATH, STATE_PATH, STATUS_PATH,
};
use bullyscale::state::ReplicatedState;

/// BullyScale Cluster Control Tool
#[derive(Parser)]
#[command(name = "bullyctl")]
#[command(about = "Control and monitor BullyScale clusters", long_about = None)]
struct Cli {
    /// Node endpoint to talk to
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    endpoint: String,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show status of the node
    Status,
    /// Query every node listed in a configuration file
    Cluster {
        /// Path to config file
        #[arg(short, long, default_value = "bullyscale.toml")]
        config: PathBuf,
    },
    /// Submit an event (the node must be primary)
    Submit {
        /// Event payload
        value: String,
    },
    /// Print the replicated state (the node must be primary)
    State,
    /// Send a heartbeat probe
    Ping,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = run(&cli).await;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(cli.timeout_ms))
        .build()
        .context("failed to create HTTP client")?;

    match &cli.command {
        Commands::Status => show_status(&client, &cli.endpoint).await,
        Commands::Cluster { config } => show_cluster(&client, config).await,
        Commands::Submit { value } => submit(&client, &cli.endpoint, value).await,
        Commands::State => show_state(&client, &cli.endpoint).await,
        Commands::Ping => ping(&client, &cli.endpoint).await,
    }
}

// ============ Commands ============

async fn fetch_status(client: &reqwest::Client, endpoint: &str) -> anyhow::Result<StatusResponse> {
    let response = client
        .get(peer_url(endpoint, STATUS_PATH))
        .send()
        .await
        .with_context(|| format!("{} is unreachable", endpoint))?;

    if !response.status().is_success() {
        bail!("API error: {}", response.status());
    }
    Ok(response.json().await?)
}

/// Turn a non-success answer into an error carrying the server's message
async fn api_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => anyhow::anyhow!("{} ({}): {}", status, body.code, body.error),
        Err(_) => anyhow::anyhow!("API error: {}", status),
    }
}

async fn show_status(client: &reqwest::Client, endpoint: &str) -> anyhow::Result<()> {
    let status = fetch_status(client, endpoint).await?;

    println!();
    println!("Node Status");
    println!("===========");
    println!();
    println!("Node ID:         {}", status.node_id);
    println!("Role:            {}", if status.is_primary { "PRIMARY" } else { "Secondary" });
    if status.primary_id == 0 {
        println!("Primary:         unknown");
    } else {
        println!("Primary:         {}", status.primary_id);
    }
    println!("Election:        {}", if status.election_in_progress { "in progress" } else { "idle" });
    println!("Sequence Number: {}", status.sequence_number);
    println!("Events:          {}", status.event_count);
    println!("Started:         {}", status.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Cluster Size:    {}", status.peers.len());
    println!();

    Ok(())
}

async fn show_cluster(client: &reqwest::Client, config_path: &Path) -> anyhow::Result<()> {
    // Only the peer list is needed; node.id may be left to `start --id`
    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let config: BullyScaleConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;

    let queries = config.cluster.peers.iter().map(|peer| async move {
        (peer, fetch_status(client, &peer.address).await)
    });
    let results = futures::future::join_all(queries).await;

    println!();
    println!("BullyScale Cluster Status (bullyctl v{})", env!("CARGO_PKG_VERSION"));
    println!("========================================");
    println!();
    println!("{:<8} {:<25} {:<10} {:<10} {:<10}", "NODE", "ADDRESS", "STATUS", "ROLE", "SEQUENCE");
    println!("{}", "-".repeat(65));

    for (peer, result) in results {
        match result {
            Ok(status) => {
                // Pad to fixed width before adding color codes
                let role_padded = format!("{:<10}", if status.is_primary { "Primary" } else { "Secondary" });
                let role = if status.is_primary {
                    format!("\x1b[1;34m{}\x1b[0m", role_padded)
                } else {
                    role_padded
                };
                println!(
                    "{:<8} {:<25} \x1b[32m{:<10}\x1b[0m {} {:<10}",
                    peer.id, peer.address, "Online", role, status.sequence_number
                );
            }
            Err(_) => {
                println!(
                    "{:<8} {:<25} \x1b[31m{:<10}\x1b[0m {:<10} {:<10}",
                    peer.id, peer.address, "Offline", "-", "-"
                );
            }
        }
    }
    println!();

    Ok(())
}

async fn submit(client: &reqwest::Client, endpoint: &str, value: &str) -> anyhow::Result<()> {
    let response = client
        .post(peer_url(endpoint, EVENT_PATH))
        .json(&EventRequest {
            value: Some(value.to_string()),
        })
        .send()
        .await
        .with_context(|| format!("{} is unreachable", endpoint))?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let accepted: EventResponse = response.json().await?;
    println!(
        "✓ Event {} accepted (sequence number {})",
        accepted.event.id, accepted.sequence_number
    );
    Ok(())
}

async fn show_state(client: &reqwest::Client, endpoint: &str) -> anyhow::Result<()> {
    let response = client
        .get(peer_url(endpoint, STATE_PATH))
        .send()
        .await
        .with_context(|| format!("{} is unreachable", endpoint))?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let state: ReplicatedState = response.json().await?;
    println!("Sequence Number: {}", state.sequence_number);
    println!();
    for event in &state.event_log {
        println!("{:>6}  {}", event.id, event.value);
    }
    Ok(())
}

async fn ping(client: &reqwest::Client, endpoint: &str) -> anyhow::Result<()> {
    let started = std::time::Instant::now();
    let response = client
        .get(peer_url(endpoint, HEARTBEAT_PATH))
        .send()
        .await
        .with_context(|| format!("{} is unreachable", endpoint))?;

    if !response.status().is_success() {
        bail!("API error: {}", response.status());
    }

    let body = response.text().await?;
    println!("{} from {} in {:?}", body.trim(), endpoint, started.elapsed());
    Ok(())
}
