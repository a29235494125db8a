//! Multi-League Odds Ingestion Service
//!
//! Pulls betting-market data for nine leagues from the odds provider,
//! normalizes it, and persists opening and current lines to Postgres.
//! Runs as a one-shot scheduled job by default; set RUN_ONCE=false for a
//! continuous polling loop with a health endpoint.

mod config;
mod error;
mod fetcher;
mod leagues;
mod models;
mod persist;
mod service;
mod transform;

use anyhow::Result;
use axum::{http::StatusCode, routing::get, Json, Router};
use serde_json::json;
use tracing::{error, info};

use crate::config::Config;
use crate::leagues::LeagueRegistry;
use crate::service::{HealthState, IngestionService};

/// Health check handler
async fn health_handler(
    axum::extract::State(health): axum::extract::State<HealthState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let last_run = health.last_run_time.read().await;
    let last_games = health.last_run_games.read().await;
    let errors = health.error_count.read().await;

    let status = if *errors > 5 { "degraded" } else { "ok" };

    let http_status = if *errors > 10 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        http_status,
        Json(json!({
            "service": "odds-sync",
            "version": env!("CARGO_PKG_VERSION"),
            "status": status,
            "last_run": last_run.map(|t| t.to_rfc3339()),
            "last_run_games": *last_games,
            "consecutive_errors": *errors
        })),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("odds_sync=info".parse().unwrap()),
        )
        .init();

    info!("Multi-League Odds Ingestion Service v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let health_port = config.health_port;
    let run_once = config.run_once;

    let registry = LeagueRegistry::standard();
    let service = IngestionService::new(config, registry).await?;

    // One-shot mode (scheduled job): a single pass, exit code reflects
    // whether anything succeeded.
    if run_once {
        let summary = service.run_all().await;
        if summary.leagues_ok == 0 {
            anyhow::bail!(
                "ingestion run {} failed for all {} leagues",
                summary.run_id,
                summary.leagues_failed
            );
        }
        return Ok(());
    }

    // Continuous mode: health endpoint + polling loop until Ctrl-C.
    let app = Router::new()
        .route("/health", get(health_handler))
        .with_state(service.health.clone());

    let health_addr = format!("0.0.0.0:{}", health_port);
    info!("Health endpoint listening on {}", health_addr);

    let listener = tokio::net::TcpListener::bind(&health_addr).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Health server error: {e}");
        }
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        _ = service.run_loop() => {}
        _ = ctrl_c => {
            info!("Shutting down...");
        }
    }

    Ok(())
}
