//! Keiba Board
//!
//! REST API and CLI over race predictions: schedule reconciliation, 勝負度,
//! expected-value bets and backtest ROI.

mod backtest;
mod betting;
mod board;
mod cli;
mod confidence;
mod config;
mod loader;
mod outcome;
mod recommendation;
mod routes;
mod schedule;
mod store;
mod types;

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keiba_board=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => run_server(host, port).await,
        Commands::Dates { format } => cli::run_dates(format),
        Commands::Races { date, format } => cli::run_races(date, format),
        Commands::Fight {
            date,
            min_level,
            format,
        } => cli::run_fight(date, min_level, format),
        Commands::Calendar {
            date,
            grades,
            surface,
            format,
        } => cli::run_calendar(date, grades, surface, format),
        Commands::Backtest {
            axes,
            min_races,
            top_n,
            format,
        } => cli::run_backtest(axes, min_races, top_n, format),
    }
}

/// Run the API server.
async fn run_server(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    // Load configuration
    let mut config = AppConfig::load()?;

    // Override with CLI args
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }

    tracing::info!("Configuration loaded");
    tracing::info!("Predictions dir: {}", config.data.predictions_dir);

    let store = loader::load_store(&config.data)?;
    let backtest = loader::load_backtest(&config.data.strategy_dir);

    // Create application state
    let state = Arc::new(AppState {
        store,
        backtest,
        config: config.clone(),
    });

    let app = routes::router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
