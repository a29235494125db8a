//! Batch orchestration across leagues.
//!
//! Leagues run in fixed-size concurrent batches. A league's failure is
//! captured as outcome data and never cancels its siblings; every league is
//! attempted exactly once per run.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{Config, INTER_BATCH_DELAY_MS, LEAGUE_BATCH_SIZE};
use crate::error::{PipelineError, Result};
use crate::fetcher::{fetch_events, DateWindow, ProviderClient};
use crate::leagues::{LeagueRegistry, SUPPORTED_LEAGUES};
use crate::models::{EventBundle, LeagueOutcome, RunSummary};
use crate::persist::Store;
use crate::transform::transform_event;

/// Service health state, exposed by the health endpoint in continuous mode.
#[derive(Clone)]
pub struct HealthState {
    pub last_run_time: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_run_games: Arc<RwLock<usize>>,
    pub error_count: Arc<RwLock<usize>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            last_run_time: Arc::new(RwLock::new(None)),
            last_run_games: Arc::new(RwLock::new(0)),
            error_count: Arc::new(RwLock::new(0)),
        }
    }

    pub async fn record_success(&self, games: usize) {
        *self.last_run_time.write().await = Some(Utc::now());
        *self.last_run_games.write().await = games;
        *self.error_count.write().await = 0;
    }

    pub async fn record_error(&self) {
        *self.error_count.write().await += 1;
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct LeagueReport {
    games: usize,
    truncated: bool,
}

/// Odds ingestion service: fetch, transform, and persist per league, batched
/// across all supported leagues.
pub struct IngestionService {
    config: Config,
    registry: LeagueRegistry,
    client: ProviderClient,
    store: Store,
    pub health: HealthState,
}

impl IngestionService {
    pub async fn new(config: Config, registry: LeagueRegistry) -> Result<Self> {
        let store = Store::connect(&config.database_url).await?;
        let client = ProviderClient::new(&config)?;
        Ok(Self {
            config,
            registry,
            client,
            store,
            health: HealthState::new(),
        })
    }

    /// One full ingestion pass across every supported league.
    pub async fn run_all(&self) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%run_id, leagues = SUPPORTED_LEAGUES.len(), "starting ingestion run");

        let outcomes = run_batches(
            &SUPPORTED_LEAGUES,
            LEAGUE_BATCH_SIZE,
            Duration::from_millis(INTER_BATCH_DELAY_MS),
            |code| self.league_outcome(code),
        )
        .await;

        let summary = RunSummary::from_outcomes(run_id, outcomes, started.elapsed());
        for outcome in &summary.outcomes {
            match &outcome.error {
                None => info!(
                    %run_id,
                    league = outcome.league,
                    games = outcome.games,
                    truncated = outcome.truncated,
                    duration_ms = outcome.duration.as_millis() as u64,
                    "league done"
                ),
                Some(err) => warn!(
                    %run_id,
                    league = outcome.league,
                    duration_ms = outcome.duration.as_millis() as u64,
                    error = %err,
                    "league failed"
                ),
            }
        }
        info!(
            %run_id,
            total_games = summary.total_games,
            leagues_ok = summary.leagues_ok,
            leagues_failed = summary.leagues_failed,
            truncated = summary.truncated_leagues,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "ingestion run complete"
        );
        summary
    }

    async fn league_outcome(&self, code: &'static str) -> LeagueOutcome {
        let started = Instant::now();
        let result = self.run_league(code).await;
        settle(code, result, started.elapsed())
    }

    async fn run_league(&self, code: &str) -> Result<LeagueReport> {
        let league = self
            .registry
            .resolve(code)
            .ok_or_else(|| PipelineError::UnsupportedLeague(code.to_string()))?;

        let now = Utc::now();
        let window = DateWindow::next_week(now);
        let (raw_events, fetch) = fetch_events(&self.client, league, window).await?;
        if fetch.truncated() {
            warn!(
                league = code,
                events = raw_events.len(),
                "rate limit truncated pagination; continuing with partial data"
            );
        }

        let mut bundles: Vec<EventBundle> = Vec::with_capacity(raw_events.len());
        let mut dropped = 0usize;
        for raw in &raw_events {
            match transform_event(raw, code) {
                Ok((game, quotes)) => bundles.push(EventBundle { game, quotes }),
                Err(e) => {
                    dropped += 1;
                    warn!(league = code, error = %e, "skipping malformed event");
                }
            }
        }

        let summary = self.store.persist(bundles, now).await?;
        info!(
            league = code,
            pages = fetch.pages,
            games = summary.games,
            opening = summary.opening_inserted,
            current = summary.current_upserted,
            skipped = summary.skipped_near_start,
            frozen = summary.frozen,
            dropped,
            "league ingestion finished"
        );

        Ok(LeagueReport {
            games: summary.games,
            truncated: fetch.truncated(),
        })
    }

    /// Continuous mode: re-run the full pass on a fixed interval.
    pub async fn run_loop(&self) {
        info!(
            interval_secs = self.config.poll_interval_seconds,
            "starting continuous ingestion loop"
        );
        loop {
            let summary = self.run_all().await;
            if summary.leagues_ok > 0 {
                self.health.record_success(summary.total_games).await;
            } else {
                self.health.record_error().await;
                error!("ingestion run failed for every league");
            }
            tokio::time::sleep(Duration::from_secs(self.config.poll_interval_seconds)).await;
        }
    }
}

/// Fold a league result into its outcome record. Errors become data here;
/// nothing propagates past the orchestrator.
fn settle(
    league: &'static str,
    result: Result<LeagueReport>,
    duration: Duration,
) -> LeagueOutcome {
    match result {
        Ok(report) => LeagueOutcome {
            league,
            games: report.games,
            success: true,
            truncated: report.truncated,
            duration,
            error: None,
        },
        Err(e) => LeagueOutcome {
            league,
            games: 0,
            success: false,
            truncated: false,
            duration,
            error: Some(e.to_string()),
        },
    }
}

/// Dispatch leagues in fixed-size concurrent batches with a settle-all join,
/// pausing between batches except after the last one.
async fn run_batches<F, Fut>(
    leagues: &[&'static str],
    batch_size: usize,
    delay: Duration,
    run: F,
) -> Vec<LeagueOutcome>
where
    F: Fn(&'static str) -> Fut,
    Fut: Future<Output = LeagueOutcome>,
{
    let mut outcomes = Vec::with_capacity(leagues.len());
    let batch_count = leagues.len().div_ceil(batch_size);
    for (i, batch) in leagues.chunks(batch_size).enumerate() {
        let mut settled = join_all(batch.iter().map(|code| run(*code))).await;
        outcomes.append(&mut settled);
        if i + 1 < batch_count {
            tokio::time::sleep(delay).await;
        }
    }
    outcomes
}
