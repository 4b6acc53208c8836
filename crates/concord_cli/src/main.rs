//! CONCORD CLI
//!
//! Drives a local synchronizer agent from JSON files.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use concord_state::{StateData, StateDiffer, StateSnapshot};
use concord_sync::{SyncConfig, SynchronizerAgent};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "concord")]
#[command(about = "CONCORD - State synchronization coordinator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed state updates, then detect and resolve drift
    Ingest {
        /// JSON array of `{node_id, data, version}` updates
        #[arg(short, long)]
        input: PathBuf,
        /// Agent configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Emit signed beats as JSON lines
    Beat {
        /// Number of beats
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u64,
        /// Agent configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Diff two state data files
    Diff {
        /// First state
        #[arg(long)]
        left: PathBuf,
        /// Second state
        #[arg(long)]
        right: PathBuf,
    },
}

/// One line of an ingest file
#[derive(Debug, Deserialize)]
struct StateUpdate {
    node_id: String,
    data: StateData,
    #[serde(default = "first_version")]
    version: u64,
}

fn first_version() -> u64 {
    1
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("parsing {}", path.display()))
}

fn load_agent(config: Option<&Path>) -> Result<SynchronizerAgent> {
    let config = match config {
        Some(path) => read_json::<SyncConfig>(path)?,
        None => SyncConfig::default(),
    };
    config.validate()?;
    Ok(SynchronizerAgent::new(config))
}

async fn ingest(input: &Path, config: Option<&Path>) -> Result<()> {
    let agent = load_agent(config)?;
    agent.start().await;

    let updates: Vec<StateUpdate> = read_json(input)?;
    tracing::info!(updates = updates.len(), "Ingesting state updates");
    for update in updates {
        agent
            .receive_state(update.node_id, update.data, update.version)
            .await?;
    }

    let drift = agent.detect_drift().await;
    let resolved = agent.resolve_drift().await;

    let report = json!({
        "drift_detected": drift,
        "resolved_state": resolved,
        "metrics": agent.metrics().await,
        "commit_history": agent.commit_history(None).await,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    agent.shutdown().await;
    Ok(())
}

async fn beat(count: u64, config: Option<&Path>) -> Result<()> {
    let agent = load_agent(config)?;
    agent.start().await;
    for _ in 0..count {
        let beat = agent.generate_beat().await?;
        println!("{}", serde_json::to_string(&beat)?);
    }
    agent.shutdown().await;
    Ok(())
}

fn diff(left: &Path, right: &Path) -> Result<()> {
    let left = StateSnapshot::capture("left", read_json(left)?, 1)?;
    let right = StateSnapshot::capture("right", read_json(right)?, 1)?;
    let diff = StateDiffer::new().diff(&left, &right);

    tracing::info!(differing_keys = diff.len(), "Diff computed");
    println!("{}", serde_json::to_string_pretty(&diff)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("concord=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { input, config } => ingest(&input, config.as_deref()).await,
        Commands::Beat { count, config } => beat(count, config.as_deref()).await,
        Commands::Diff { left, right } => diff(&left, &right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["concord", "beat", "--count", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Beat { count: 3, config: None }));

        let cli = Cli::try_parse_from(["concord", "diff", "--left", "a.json", "--right", "b.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Diff { .. }));

        assert!(Cli::try_parse_from(["concord", "ingest"]).is_err());
    }

    #[test]
    fn test_update_version_defaults() {
        let update: StateUpdate =
            serde_json::from_str(r#"{"node_id": "vault1", "data": {"balance": 100}}"#).unwrap();
        assert_eq!(update.node_id, "vault1");
        assert_eq!(update.version, 1);
        assert_eq!(update.data["balance"], json!(100));
    }
}
