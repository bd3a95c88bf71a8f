//! questline - self-hosted personal gamification tracker
//!
//! Assigns daily and weekly quests, logs tasks/habits/events, scores each
//! day against a point goal, and keeps a completion streak across days.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod api;
mod clock;
mod config;
mod db;
mod engine;
mod models;
mod quests;
mod scoring;
mod state;

use config::Config;

#[derive(Parser)]
#[command(name = "questline")]
#[command(about = "Self-hosted personal gamification tracker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Initialize a new config file
    Init {
        /// Output path for config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("questline=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, bind } => {
            let mut cfg = if let Some(path) = config {
                Config::load_from(&path)?
            } else {
                Config::load()?
            };

            // Override with CLI args
            if let Some(p) = port {
                cfg.server.port = p;
            }
            if let Some(b) = bind {
                cfg.server.bind = b;
            }

            run_server(cfg).await
        }

        Commands::Init { output } => {
            let path = output.unwrap_or_else(|| PathBuf::from("config.toml"));
            let cfg = Config::default();
            cfg.save_to(&path)?;

            println!("Created config file: {}", path.display());
            println!();
            println!("Start the server with: questline serve --config {}", path.display());

            Ok(())
        }
    }
}

async fn run_server(config: Config) -> Result<()> {
    let db = db::Database::open(&config.database.path).context("Failed to open database")?;
    let engine = engine::Engine::boot(db).context("Failed to boot engine")?;

    let state = api::AppState::new(engine);
    let app = api::create_router(state.clone());

    // Periodic day-change check. The rollover entry point is idempotent,
    // so this tick and any API-triggered rollover can overlap freely.
    let tick_state = state.clone();
    let interval = Duration::from_secs(config.server.rollover_check_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = tick_state.engine.ensure_rollover() {
                tracing::error!(error = %e, "rollover check failed");
            }
        }
    });

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("questline server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
