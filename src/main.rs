mod backup;
mod config;
mod http;
mod identity;
mod jellyfin;
mod missing;
mod models;
mod restore;
mod tvdb;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{Configuration, Overrides, DEFAULT_CONFIG_FILE};
use http::HttpClient;
use jellyfin::JellyfinClient;
use std::path::Path;
use tracing::{debug, info, warn};
use tvdb::TvdbClient;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file [default: config.yaml, if present]
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Jellyfin server URL (e.g. http://localhost:8096)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Jellyfin API key
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Jellyfin user name
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save the user's watched movies and episodes to a file
    Backup {
        /// Backup file path
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Mark the items of a backup file as watched
    Restore {
        /// Backup file path
        #[arg(short, long)]
        file: Option<String>,
    },
    /// List aired episodes that are missing from the library, using TVDB
    FindMissing {
        /// TVDB API key
        #[arg(long)]
        tvdb_api_key: Option<String>,

        /// Include specials (season 0)
        #[arg(long)]
        include_specials: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .init();

    info!("Starting Jellyfin Manager v{}", backup::APP_VERSION);

    let mut overrides = Overrides {
        server_url: cli.server.clone(),
        api_key: cli.api_key.clone(),
        user: cli.user.clone(),
        ..Overrides::default()
    };
    match &cli.command {
        Command::Backup { file } | Command::Restore { file } => overrides.backup_file = file.clone(),
        Command::FindMissing { tvdb_api_key, .. } => overrides.tvdb_api_key = tvdb_api_key.clone(),
    }

    let file_config = match &cli.config {
        Some(path) => Configuration::from_file(path)?,
        None => Configuration::load_default(DEFAULT_CONFIG_FILE)?,
    };
    let config = file_config
        .with_env(|key| std::env::var(key).ok())
        .with_overrides(overrides);

    let http_client = HttpClient::new()?;
    let client = JellyfinClient::connect(http_client.clone(), config.connection()?).await?;

    match cli.command {
        Command::Backup { .. } => run_backup(&client, &config).await,
        Command::Restore { .. } => run_restore(&client, &config).await,
        Command::FindMissing {
            include_specials, ..
        } => run_find_missing(&client, &config, http_client, include_specials).await,
    }
}

async fn run_backup(client: &JellyfinClient, config: &Configuration) -> Result<()> {
    let connection = client.connection();
    info!("Fetching watched items for user {}", connection.user_name);

    let watched = client.get_watched_items().await?;
    let snapshot = backup::new_backup(
        &connection.server_url,
        client.user_id(),
        &connection.user_name,
        watched,
    );
    backup::save(&snapshot, Path::new(config.backup_file()))
}

async fn run_restore(client: &JellyfinClient, config: &Configuration) -> Result<()> {
    let snapshot = backup::load(Path::new(config.backup_file()))?;
    info!(
        "Restoring {} watched items for {} from backup created at {}",
        snapshot.watched_items.len(),
        client.connection().user_name,
        snapshot.created_at.to_rfc3339()
    );

    let summary = restore::restore(client, &snapshot).await;
    info!("Successful: {}", summary.successful);
    info!("Failed: {}", summary.failed);
    info!("Total: {}", summary.total);
    Ok(())
}

async fn run_find_missing(
    client: &JellyfinClient,
    config: &Configuration,
    http_client: HttpClient,
    include_specials: bool,
) -> Result<()> {
    let mut tvdb = TvdbClient::new(http_client, config.tvdb_api_key()?.to_string());
    tvdb.login().await?;

    let today = chrono::Utc::now().date_naive();
    let summary = missing::scan_library(client, &tvdb, include_specials, today).await?;

    for report in &summary.reports {
        warn!(
            "{} (TVDB: {}): missing {} episodes (of {} total)",
            report.series_name,
            report.tvdb_id,
            report.missing.len(),
            report.catalog_total
        );
        for m in &report.missing {
            info!(
                "  - S{:02}E{:02}: {} (Aired: {})",
                m.season_number, m.episode_number, m.name, m.air_date
            );
            if !m.overview.is_empty() {
                debug!("      {}", m.overview);
            }
        }
    }

    info!("=== Summary ===");
    info!("Total series checked: {}", summary.series_checked);
    if summary.series_failed > 0 {
        info!("Series that could not be checked: {}", summary.series_failed);
    }
    info!("Total missing episodes: {}", summary.total_missing());
    Ok(())
}
