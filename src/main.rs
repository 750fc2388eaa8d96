mod api;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod services;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "parlaydesk")]
#[command(about = "NHL parlay builder with best-price lookup and automatic settlement")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Overrides API_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Initialize the database
    InitDb,
    /// Load sample NHL teams, games, odds and a parlay
    Seed {
        /// Wipe existing data first
        #[arg(long)]
        reset: bool,
    },
    /// Settle pending parlays whose games are finished
    Sweep,
    /// Show the best price per market across sportsbooks for a game
    BestOdds {
        #[arg(short, long)]
        game: String,
    },
    /// List parlays with their legs
    Parlays {
        /// pending, won, lost or partially_won
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Export parlays and legs to CSV
    Export {
        #[arg(short, long, default_value = "data/exports/parlays.csv")]
        out: PathBuf,
    },
    /// Pull odds and final scores from The Odds API
    FetchOdds {
        /// Ignore the refresh window
        #[arg(long)]
        force: bool,
    },
    /// Pull recent articles from the news feed and tag teams and players
    FetchNews,
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let json = std::env::var("LOG_JSON").map(|v| v == "1" || v == "true").unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let settings = Settings::from_env()?;
    init_logging(&settings);

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port }) => {
            let port = port.unwrap_or(settings.api_port);
            tracing::info!("Starting ParlayDesk API server on port {}", port);
            api::serve(settings, port).await?;
        }
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            db::init_database(&settings.database_url).await?;
        }
        Some(Commands::Seed { reset }) => cli::seed(&settings, reset).await?,
        Some(Commands::Sweep) => cli::sweep(&settings).await?,
        Some(Commands::BestOdds { game }) => cli::best_odds(&settings, &game).await?,
        Some(Commands::Parlays { status }) => cli::list_parlays(&settings, status.as_deref()).await?,
        Some(Commands::Export { out }) => cli::export_parlays(&settings, &out).await?,
        Some(Commands::FetchOdds { force }) => cli::fetch_odds(&settings, force).await?,
        Some(Commands::FetchNews) => cli::fetch_news(&settings).await?,
        None => {
            // Default to serving
            let port = settings.api_port;
            tracing::info!("Starting ParlayDesk API server on port {}", port);
            api::serve(settings, port).await?;
        }
    }

    Ok(())
}
