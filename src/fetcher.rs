//! Cursor-paginated event fetching from the odds provider.
//!
//! One call to [`fetch_events`] pages through `/v2/events` for a single
//! league until the provider runs out of results or a safety limit trips.
//! The loop never issues more than [`MAX_PAGES_PER_LEAGUE`] requests and
//! never returns more than [`MAX_EVENTS_PER_LEAGUE`] events, regardless of
//! provider behavior. A 429 stops pagination without raising an error;
//! whatever accumulated so far is returned, flagged as truncated.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{
    Config, FETCH_WINDOW_DAYS, MAX_EVENTS_PER_LEAGUE, MAX_PAGES_PER_LEAGUE, MIN_REQUEST_GAP_MS,
    PAGE_SIZE,
};
use crate::error::{PipelineError, Result};
use crate::leagues::LeagueMapping;

/// Provider response envelope for `/v2/events`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventsEnvelope {
    pub success: bool,
    pub data: Vec<RawEvent>,
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawEvent {
    #[serde(rename = "eventID")]
    pub event_id: String,
    pub status: RawStatus,
    pub teams: RawTeams,
    /// Keyed by the provider's odd id for the market/side combination.
    pub odds: HashMap<String, RawOddsEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStatus {
    #[serde(rename = "startsAt")]
    pub starts_at: Option<DateTime<Utc>>,
    pub started: bool,
    pub live: bool,
    pub completed: bool,
    pub cancelled: bool,
    #[serde(rename = "homeScore")]
    pub home_score: Option<i32>,
    #[serde(rename = "awayScore")]
    pub away_score: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTeams {
    pub home: Option<RawTeam>,
    pub away: Option<RawTeam>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTeam {
    pub names: RawTeamNames,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTeamNames {
    pub long: Option<String>,
    pub medium: Option<String>,
    pub short: Option<String>,
}

/// One raw odds entry. Price-ish fields stay as `Value` because the provider
/// sends them as numbers or strings interchangeably; sanitization happens in
/// the transformer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawOddsEntry {
    #[serde(rename = "marketName")]
    pub market_name: Option<String>,
    #[serde(rename = "betTypeID")]
    pub bet_type_id: Option<String>,
    #[serde(rename = "sideID")]
    pub side_id: Option<String>,
    #[serde(rename = "bookOdds")]
    pub book_odds: Option<Value>,
    #[serde(rename = "fairOdds")]
    pub fair_odds: Option<Value>,
    #[serde(rename = "bookSpread")]
    pub book_spread: Option<Value>,
    #[serde(rename = "fairSpread")]
    pub fair_spread: Option<Value>,
    #[serde(rename = "bookOverUnder")]
    pub book_over_under: Option<Value>,
    #[serde(rename = "fairOverUnder")]
    pub fair_over_under: Option<Value>,
    #[serde(rename = "byBookmaker")]
    pub by_bookmaker: HashMap<String, RawBookOdds>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBookOdds {
    #[serde(rename = "bookOdds")]
    pub book_odds: Option<Value>,
    #[serde(rename = "deepLink")]
    pub deep_link: Option<String>,
}

/// Date window sent as `startsAfter`/`startsBefore` (ISO date, no time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub starts_after: NaiveDate,
    pub starts_before: NaiveDate,
}

impl DateWindow {
    pub fn next_week(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        Self {
            starts_after: today,
            starts_before: today + chrono::Duration::days(FETCH_WINDOW_DAYS),
        }
    }
}

/// One page of provider results plus the quota hint from its headers.
#[derive(Debug, Clone)]
pub struct EventsPage {
    pub events: Vec<RawEvent>,
    pub next_cursor: Option<String>,
    pub requests_remaining: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum PageResponse {
    Page(EventsPage),
    /// HTTP 429. Pagination stops; accumulated events are kept.
    RateLimited,
}

/// Why pagination stopped. Every variant is a normal termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The response carried no `nextCursor`.
    Exhausted,
    /// A page returned zero records.
    EmptyPage,
    PageCap,
    RecordCap,
    RateLimited,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOutcome {
    pub pages: u32,
    pub stop: StopReason,
}

impl FetchOutcome {
    /// True when the result set was cut short by a provider rate limit.
    pub fn truncated(&self) -> bool {
        matches!(self.stop, StopReason::RateLimited)
    }
}

/// Source of event pages. The production implementation is
/// [`ProviderClient`]; tests drive the pagination loop with a scripted
/// source.
pub(crate) trait PageSource {
    async fn page(
        &self,
        league: &LeagueMapping,
        window: DateWindow,
        cursor: Option<&str>,
    ) -> Result<PageResponse>;
}

/// Page through all events for one league inside the date window.
pub(crate) async fn fetch_events<S: PageSource>(
    source: &S,
    league: &LeagueMapping,
    window: DateWindow,
) -> Result<(Vec<RawEvent>, FetchOutcome)> {
    let mut events: Vec<RawEvent> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0u32;

    let stop = loop {
        let page = match source.page(league, window, cursor.as_deref()).await? {
            PageResponse::Page(page) => page,
            PageResponse::RateLimited => break StopReason::RateLimited,
        };
        pages += 1;

        if page.events.is_empty() {
            break StopReason::EmptyPage;
        }
        events.extend(page.events);
        if events.len() >= MAX_EVENTS_PER_LEAGUE {
            events.truncate(MAX_EVENTS_PER_LEAGUE);
            break StopReason::RecordCap;
        }
        cursor = match page.next_cursor {
            Some(next) => Some(next),
            None => break StopReason::Exhausted,
        };
        if pages >= MAX_PAGES_PER_LEAGUE {
            break StopReason::PageCap;
        }

        tokio::time::sleep(pacing_delay(page.requests_remaining)).await;
    };

    Ok((events, FetchOutcome { pages, stop }))
}

/// Delay before the next page request, scaled by how much provider quota is
/// left. Advisory, not a hard token bucket.
pub(crate) fn pacing_delay(requests_remaining: Option<u32>) -> Duration {
    match requests_remaining {
        Some(remaining) if remaining > 100 => Duration::from_millis(300),
        Some(remaining) if remaining > 20 => Duration::from_millis(1000),
        Some(_) => Duration::from_millis(2000),
        None => Duration::from_millis(MIN_REQUEST_GAP_MS),
    }
}

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP client for the odds provider, shared across concurrent leagues.
/// A single direct rate limiter enforces the request floor process-wide.
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: DirectLimiter,
}

impl ProviderClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()?;

        let limiter = RateLimiter::direct(
            Quota::with_period(Duration::from_millis(MIN_REQUEST_GAP_MS)).unwrap(),
        );

        Ok(Self {
            http,
            base_url: config.provider_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            limiter,
        })
    }
}

impl PageSource for ProviderClient {
    async fn page(
        &self,
        league: &LeagueMapping,
        window: DateWindow,
        cursor: Option<&str>,
    ) -> Result<PageResponse> {
        self.limiter.until_ready().await;

        let starts_after = window.starts_after.format("%Y-%m-%d").to_string();
        let starts_before = window.starts_before.format("%Y-%m-%d").to_string();
        let limit = PAGE_SIZE.to_string();

        let url = format!("{}/v2/events", self.base_url);
        let mut request = self
            .http
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .query(&[
                ("sportID", league.sport_id),
                ("leagueID", league.league_id),
                ("type", "match"),
                ("startsAfter", starts_after.as_str()),
                ("startsBefore", starts_before.as_str()),
                ("limit", limit.as_str()),
            ]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request.send().await?;

        let requests_remaining = response
            .headers()
            .get("x-requests-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok());
        if let Some(remaining) = requests_remaining {
            debug!(league = league.code, remaining, "provider quota");
        }

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(
                league = league.code,
                "provider rate limit hit, stopping pagination early"
            );
            return Ok(PageResponse::RateLimited);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(PipelineError::Provider {
                status,
                body: snippet(&body),
            });
        }

        let envelope: EventsEnvelope = serde_json::from_str(&body)?;
        if !envelope.success {
            return Err(PipelineError::Provider {
                status,
                body: "envelope reported success=false".to_string(),
            });
        }

        Ok(PageResponse::Page(EventsPage {
            events: envelope.data,
            next_cursor: envelope.next_cursor,
            requests_remaining,
        }))
    }
}

/// Keep provider error bodies log-sized.
fn snippet(body: &str) -> String {
    const MAX: usize = 300;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        body.chars().take(MAX).collect()
    }
}
