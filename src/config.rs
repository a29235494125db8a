//! Pipeline constants and environment configuration.

use std::env;

use crate::error::{PipelineError, Result};

/// Events requested per page.
pub const PAGE_SIZE: u32 = 50;

/// Hard cap on pages fetched per league per run.
pub const MAX_PAGES_PER_LEAGUE: u32 = 20;

/// Hard cap on accumulated events per league per run.
pub const MAX_EVENTS_PER_LEAGUE: usize = 500;

/// Leagues dispatched concurrently per batch.
pub const LEAGUE_BATCH_SIZE: usize = 3;

/// Pause between league batches.
pub const INTER_BATCH_DELAY_MS: u64 = 500;

/// Floor between provider requests when no quota hint is available.
pub const MIN_REQUEST_GAP_MS: u64 = 200;

/// Games starting within this window are skipped entirely; odds that close
/// to lock are no longer actionable and the game may flip to started
/// mid-batch.
pub const LOCK_WINDOW_MINUTES: i64 = 10;

/// Fetch window: [today, today + 7 days].
pub const FETCH_WINDOW_DAYS: i64 = 7;

/// Width of the fixed-length text columns in the odds tables.
pub const TEXT_COLUMN_WIDTH: usize = 50;

/// Prices are clamped to [-PRICE_CAP, PRICE_CAP] before storage.
pub const PRICE_CAP: f64 = 9999.99;

/// Database connection attempts before giving up at startup.
pub const DB_CONNECT_RETRIES: u32 = 5;

pub const DEFAULT_PROVIDER_URL: &str = "https://api.sportsgameodds.com";

/// Configuration, loaded once at process start.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub database_url: String,
    pub provider_url: String,
    pub poll_interval_seconds: u64,
    pub health_port: u16,
    /// If true, run a single ingestion pass and exit (no polling loop).
    pub run_once: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Secrets/config:
        // - Docker Compose: read from /run/secrets/*
        // - container platforms without a secrets mount: read from env vars

        let api_key = match env::var("ODDS_API_KEY") {
            Ok(v) if !v.trim().is_empty() => v,
            Ok(_) => return Err(PipelineError::Config("ODDS_API_KEY is set but empty".into())),
            Err(_) => read_secret_file("/run/secrets/odds_api_key", "odds_api_key")?,
        };

        // Prevent accidental use of sample/placeholder keys
        let key_lower = api_key.trim().to_lowercase();
        if key_lower.contains("change_me")
            || key_lower.contains("your_")
            || key_lower.starts_with("sample")
        {
            return Err(PipelineError::Config(
                "ODDS_API_KEY appears to be a placeholder value; replace with your real key".into(),
            ));
        }

        let database_url = match env::var("DATABASE_URL") {
            Ok(v) if !v.trim().is_empty() => v,
            Ok(_) => return Err(PipelineError::Config("DATABASE_URL is set but empty".into())),
            Err(_) => {
                let db_user = env::var("DB_USER").unwrap_or_else(|_| "odds".to_string());
                let db_name = env::var("DB_NAME").unwrap_or_else(|_| "odds".to_string());
                let db_host = env::var("DB_HOST").unwrap_or_else(|_| "postgres".to_string());
                let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
                let db_password = read_secret_file("/run/secrets/db_password", "db_password")?;
                format!(
                    "postgresql://{}:{}@{}:{}/{}",
                    db_user, db_password, db_host, db_port, db_name
                )
            }
        };

        Ok(Self {
            api_key,
            database_url,
            provider_url: env::var("PROVIDER_API_URL")
                .unwrap_or_else(|_| DEFAULT_PROVIDER_URL.to_string()),
            poll_interval_seconds: env::var("POLL_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            health_port: env::var("HEALTH_PORT")
                .unwrap_or_else(|_| "8083".to_string())
                .parse()
                .unwrap_or(8083),
            run_once: env::var("RUN_ONCE")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
        })
    }
}

/// Read a secret from a Docker secret file - REQUIRED, no fallbacks.
fn read_secret_file(file_path: &str, secret_name: &str) -> Result<String> {
    std::fs::read_to_string(file_path)
        .map(|s| s.trim().to_string())
        .map_err(|_| {
            PipelineError::Config(format!(
                "secret file not found at {} ({}); set the env var or mount the secret",
                file_path, secret_name
            ))
        })
}
