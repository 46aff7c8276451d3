//! Genome Quest Server
//!
//! Runs the game backend as a standalone HTTP server.

use anyhow::{Context, Result};
use clap::Parser;
use genome_quest::{run_server, storage, GameConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "genome-quest-server")]
#[command(about = "Genome Quest game backend")]
struct Args {
    /// Optional TOML config file
    #[arg(short, long, env = "GAME_CONFIG")]
    config: Option<PathBuf>,

    /// Server host
    #[arg(long, env = "GAME_HOST")]
    host: Option<String>,

    /// Server port
    #[arg(short, long, env = "GAME_PORT")]
    port: Option<u16>,

    /// PostgreSQL connection string; SQLite is used when unset
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// SQLite database file
    #[arg(long, env = "SQLITE_PATH")]
    sqlite_path: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<GameConfig> {
        let mut config = match &self.config {
            Some(path) => GameConfig::from_file(path)?,
            None => GameConfig::default(),
        };

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = self.database_url.filter(|u| !u.is_empty()) {
            config.database.url = Some(url);
        }
        if let Some(path) = self.sqlite_path {
            config.database.sqlite_path = path;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,genome_quest=debug")),
        )
        .init();

    let config = Args::parse().into_config()?;
    info!("Starting Genome Quest server");
    info!("  Database: {:?}", config.database);

    let storage = storage::open(&config.database)
        .await
        .context("failed to open storage")?;

    run_server(config, storage).await
}
