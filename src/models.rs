//! Internal data model: games, odds quotes, and per-run outcome types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle status of a game. Once a game leaves `Scheduled`, its
/// current-odds rows are frozen; the `games` row itself keeps updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Scheduled,
    Started,
    Live,
    Final,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::Started => "started",
            GameStatus::Live => "live",
            GameStatus::Final => "final",
        }
    }

    pub fn has_started(&self) -> bool {
        !matches!(self, GameStatus::Scheduled)
    }
}

/// One game, keyed by the provider's event id. Upserted on every fetch,
/// never deleted by this pipeline.
#[derive(Debug, Clone)]
pub struct Game {
    pub id: String,
    pub league: String,
    /// Normalized display name, stable for downstream matching.
    pub home_team: String,
    pub away_team: String,
    /// Name exactly as the provider sent it.
    pub home_team_raw: String,
    pub away_team_raw: String,
    pub start_time: Option<DateTime<Utc>>,
    pub status: GameStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

/// Bet market variant; each variant owns exactly the fields it needs.
/// Moneylines never carry a line, spreads and totals carry one when the
/// provider priced one.
#[derive(Debug, Clone, PartialEq)]
pub enum BetMarket {
    Moneyline,
    Spread { line: Option<f64> },
    Total { line: Option<f64> },
    Other { code: String, line: Option<f64> },
}

/// Price and deeplink from a single whitelisted sportsbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookQuote {
    pub odds: Option<f64>,
    pub deep_link: Option<String>,
}

/// The seven sportsbooks flattened into named columns; anything else in the
/// payload is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SportsbookPrices {
    pub fanduel: Option<BookQuote>,
    pub draftkings: Option<BookQuote>,
    pub caesars: Option<BookQuote>,
    pub betmgm: Option<BookQuote>,
    pub espnbet: Option<BookQuote>,
    pub fanatics: Option<BookQuote>,
    pub bovada: Option<BookQuote>,
}

impl SportsbookPrices {
    /// Store a quote if the book is whitelisted; returns false otherwise.
    pub fn set(&mut self, book: &str, quote: BookQuote) -> bool {
        match book {
            "fanduel" => self.fanduel = Some(quote),
            "draftkings" => self.draftkings = Some(quote),
            "caesars" => self.caesars = Some(quote),
            "betmgm" => self.betmgm = Some(quote),
            "espnbet" => self.espnbet = Some(quote),
            "fanatics" => self.fanatics = Some(quote),
            "bovada" => self.bovada = Some(quote),
            _ => return false,
        }
        true
    }

    /// Column order matches [`SPORTSBOOKS`].
    pub fn all(&self) -> [&Option<BookQuote>; 7] {
        [
            &self.fanduel,
            &self.draftkings,
            &self.caesars,
            &self.betmgm,
            &self.espnbet,
            &self.fanatics,
            &self.bovada,
        ]
    }
}

/// One priced market side for one event, aggregated across sportsbooks.
/// `(event_id, odd_id)` is the natural key in both odds tables.
#[derive(Debug, Clone)]
pub struct OddsQuote {
    pub event_id: String,
    pub odd_id: String,
    pub market_name: String,
    pub side_id: String,
    pub market: BetMarket,
    pub book_odds: Option<f64>,
    pub books: SportsbookPrices,
}

/// A transformed event and its quotes, ready for persistence.
#[derive(Debug, Clone)]
pub struct EventBundle {
    pub game: Game,
    pub quotes: Vec<OddsQuote>,
}

/// Per-league result of one run. Never persisted.
#[derive(Debug, Clone)]
pub struct LeagueOutcome {
    pub league: &'static str,
    pub games: usize,
    pub success: bool,
    /// Pagination was cut short by a provider rate limit; partial data was
    /// kept and persisted.
    pub truncated: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total_games: usize,
    pub leagues_ok: usize,
    pub leagues_failed: usize,
    pub truncated_leagues: usize,
    pub elapsed: Duration,
    pub outcomes: Vec<LeagueOutcome>,
}

impl RunSummary {
    pub fn from_outcomes(run_id: Uuid, outcomes: Vec<LeagueOutcome>, elapsed: Duration) -> Self {
        Self {
            run_id,
            total_games: outcomes.iter().map(|o| o.games).sum(),
            leagues_ok: outcomes.iter().filter(|o| o.success).count(),
            leagues_failed: outcomes.iter().filter(|o| !o.success).count(),
            truncated_leagues: outcomes.iter().filter(|o| o.truncated).count(),
            elapsed,
            outcomes,
        }
    }
}
