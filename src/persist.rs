//! Dual-table persistence for games and odds.
//!
//! Every quote is split across two consistency contracts: `open_odds` is
//! write-once per `(eventid, oddid)` key, `odds` is last-write-wins until
//! the owning game starts. Staging is pure and testable; the SQL layer
//! executes set-based statements with `ON CONFLICT` resolution so concurrent
//! runs racing on the same key never error and never duplicate.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, warn};

use crate::config::{DB_CONNECT_RETRIES, LOCK_WINDOW_MINUTES};
use crate::error::Result;
use crate::models::{BetMarket, EventBundle, Game, OddsQuote, SportsbookPrices};

/// Rows per multi-row statement. 22 binds per odds row keeps a chunk well
/// under the Postgres u16 bind-parameter limit.
const WRITE_CHUNK: usize = 250;

/// Flat storage row shared by `open_odds` and `odds`.
#[derive(Debug, Clone)]
pub struct OddsRow {
    pub event_id: String,
    pub odd_id: String,
    pub market_name: String,
    pub bet_type: String,
    pub side_id: String,
    pub book_odds: Option<f64>,
    pub line: Option<f64>,
    pub books: SportsbookPrices,
    pub game_started: bool,
}

/// The single exhaustive mapping from a quote to its flat storage row.
pub fn quote_row(game: &Game, quote: OddsQuote) -> OddsRow {
    let (bet_type, line) = match quote.market {
        BetMarket::Moneyline => ("ml".to_string(), None),
        BetMarket::Spread { line } => ("sp".to_string(), line),
        BetMarket::Total { line } => ("ou".to_string(), line),
        BetMarket::Other { code, line } => (code, line),
    };
    OddsRow {
        event_id: quote.event_id,
        odd_id: quote.odd_id,
        market_name: quote.market_name,
        bet_type,
        side_id: quote.side_id,
        book_odds: quote.book_odds,
        line,
        books: quote.books,
        game_started: game.status.has_started(),
    }
}

#[derive(Debug, Default)]
pub struct StagedBatch {
    pub games: Vec<Game>,
    pub rows: Vec<OddsRow>,
    pub skipped_near_start: usize,
}

/// Drop scheduled games starting inside the lock window and flatten the
/// surviving quotes. Games that already started pass through: their `games`
/// row still refreshes, the freeze rule handles their odds downstream.
pub fn stage_events(bundles: Vec<EventBundle>, now: DateTime<Utc>) -> StagedBatch {
    let lock_cutoff = now + chrono::Duration::minutes(LOCK_WINDOW_MINUTES);
    let mut staged = StagedBatch::default();

    for bundle in bundles {
        let near_start = !bundle.game.status.has_started()
            && bundle
                .game
                .start_time
                .map(|starts| starts < lock_cutoff)
                .unwrap_or(false);
        if near_start {
            staged.skipped_near_start += 1;
            continue;
        }
        for quote in bundle.quotes {
            staged.rows.push(quote_row(&bundle.game, quote));
        }
        staged.games.push(bundle.game);
    }

    staged
}

#[derive(Debug, Default)]
pub struct RowSplit {
    /// First observation of the key: insert into `open_odds`.
    pub opening: Vec<OddsRow>,
    /// Latest value for a not-yet-started game: upsert into `odds`.
    pub current: Vec<OddsRow>,
    /// Quotes excluded from the current-odds upsert because the game
    /// started.
    pub frozen: usize,
}

/// Route each row to its table(s) given the keys already present in
/// `open_odds`.
pub fn split_rows(rows: Vec<OddsRow>, existing_opening: &HashSet<(String, String)>) -> RowSplit {
    let mut split = RowSplit::default();
    for row in rows {
        let seen = existing_opening.contains(&(row.event_id.clone(), row.odd_id.clone()));
        if row.game_started {
            split.frozen += 1;
            if !seen {
                split.opening.push(row);
            }
        } else if seen {
            split.current.push(row);
        } else {
            split.opening.push(row.clone());
            split.current.push(row);
        }
    }
    split
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PersistSummary {
    pub games: usize,
    pub opening_inserted: usize,
    pub current_upserted: usize,
    pub skipped_near_start: usize,
    pub frozen: usize,
}

/// Postgres-backed store owning all writes to `games`, `open_odds`, and
/// `odds`.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect with retry, then apply embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut attempt = 0u32;
        let pool = loop {
            match PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(10))
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    info!("Connected to PostgreSQL");
                    break pool;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= DB_CONNECT_RETRIES {
                        return Err(e.into());
                    }
                    warn!(
                        "Database connection attempt {} failed: {}. Retrying...",
                        attempt, e
                    );
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        };

        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }

    /// Persist a batch of transformed events for one league.
    ///
    /// No cross-table transaction: a failure partway leaves earlier writes
    /// committed, which the idempotent conflict handling absorbs on the
    /// next run.
    pub async fn persist(
        &self,
        bundles: Vec<EventBundle>,
        now: DateTime<Utc>,
    ) -> Result<PersistSummary> {
        let staged = stage_events(bundles, now);
        if staged.skipped_near_start > 0 {
            debug!(
                skipped = staged.skipped_near_start,
                "dropped games starting inside the lock window"
            );
        }
        if staged.games.is_empty() {
            return Ok(PersistSummary {
                skipped_near_start: staged.skipped_near_start,
                ..PersistSummary::default()
            });
        }

        self.upsert_games(&staged.games, now).await?;

        let existing = self.existing_opening_keys(&staged.rows).await?;
        let split = split_rows(staged.rows, &existing);
        if !split.opening.is_empty() {
            self.insert_opening(&split.opening, now).await?;
        }
        if !split.current.is_empty() {
            self.upsert_current(&split.current, now).await?;
        }

        Ok(PersistSummary {
            games: staged.games.len(),
            opening_inserted: split.opening.len(),
            current_upserted: split.current.len(),
            skipped_near_start: staged.skipped_near_start,
            frozen: split.frozen,
        })
    }

    async fn upsert_games(&self, games: &[Game], now: DateTime<Utc>) -> Result<()> {
        for chunk in games.chunks(WRITE_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO games (id, league, home_team, away_team, home_team_raw, \
                 away_team_raw, start_time, status, home_score, away_score, updated_at) ",
            );
            qb.push_values(chunk, |mut b, game| {
                b.push_bind(&game.id)
                    .push_bind(&game.league)
                    .push_bind(&game.home_team)
                    .push_bind(&game.away_team)
                    .push_bind(&game.home_team_raw)
                    .push_bind(&game.away_team_raw)
                    .push_bind(game.start_time)
                    .push_bind(game.status.as_str())
                    .push_bind(game.home_score)
                    .push_bind(game.away_score)
                    .push_bind(now);
            });
            qb.push(
                " ON CONFLICT (id) DO UPDATE SET \
                 league = EXCLUDED.league, \
                 home_team = EXCLUDED.home_team, \
                 away_team = EXCLUDED.away_team, \
                 home_team_raw = EXCLUDED.home_team_raw, \
                 away_team_raw = EXCLUDED.away_team_raw, \
                 start_time = EXCLUDED.start_time, \
                 status = EXCLUDED.status, \
                 home_score = EXCLUDED.home_score, \
                 away_score = EXCLUDED.away_score, \
                 updated_at = EXCLUDED.updated_at",
            );
            qb.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    /// One batched existence check for every candidate key in the run -
    /// never one query per quote.
    async fn existing_opening_keys(
        &self,
        rows: &[OddsRow],
    ) -> Result<HashSet<(String, String)>> {
        if rows.is_empty() {
            return Ok(HashSet::new());
        }
        let event_ids: Vec<String> = rows.iter().map(|r| r.event_id.clone()).collect();
        let odd_ids: Vec<String> = rows.iter().map(|r| r.odd_id.clone()).collect();

        let found: Vec<(String, String)> = sqlx::query_as(
            "SELECT o.eventid, o.oddid \
             FROM open_odds o \
             JOIN UNNEST($1::text[], $2::text[]) AS k(eventid, oddid) \
               ON o.eventid = k.eventid AND o.oddid = k.oddid",
        )
        .bind(&event_ids)
        .bind(&odd_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(found.into_iter().collect())
    }

    /// First write wins; a concurrent run inserting the same key is ignored.
    async fn insert_opening(&self, rows: &[OddsRow], now: DateTime<Utc>) -> Result<()> {
        for chunk in rows.chunks(WRITE_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO open_odds ({ODDS_COLUMNS}, created_at) ",
            ));
            push_odds_values(&mut qb, chunk, now);
            qb.push(" ON CONFLICT (eventid, oddid) DO NOTHING");
            qb.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Last write wins for games that have not started.
    async fn upsert_current(&self, rows: &[OddsRow], now: DateTime<Utc>) -> Result<()> {
        for chunk in rows.chunks(WRITE_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO odds ({ODDS_COLUMNS}, updated_at) "));
            push_odds_values(&mut qb, chunk, now);
            qb.push(
                " ON CONFLICT (eventid, oddid) DO UPDATE SET \
                 market_name = EXCLUDED.market_name, \
                 bet_type = EXCLUDED.bet_type, \
                 side_id = EXCLUDED.side_id, \
                 book_odds = EXCLUDED.book_odds, \
                 line = EXCLUDED.line, \
                 fanduel_odds = EXCLUDED.fanduel_odds, \
                 fanduel_link = EXCLUDED.fanduel_link, \
                 draftkings_odds = EXCLUDED.draftkings_odds, \
                 draftkings_link = EXCLUDED.draftkings_link, \
                 caesars_odds = EXCLUDED.caesars_odds, \
                 caesars_link = EXCLUDED.caesars_link, \
                 betmgm_odds = EXCLUDED.betmgm_odds, \
                 betmgm_link = EXCLUDED.betmgm_link, \
                 espnbet_odds = EXCLUDED.espnbet_odds, \
                 espnbet_link = EXCLUDED.espnbet_link, \
                 fanatics_odds = EXCLUDED.fanatics_odds, \
                 fanatics_link = EXCLUDED.fanatics_link, \
                 bovada_odds = EXCLUDED.bovada_odds, \
                 bovada_link = EXCLUDED.bovada_link, \
                 updated_at = EXCLUDED.updated_at",
            );
            qb.build().execute(&self.pool).await?;
        }
        Ok(())
    }
}

const ODDS_COLUMNS: &str = "eventid, oddid, market_name, bet_type, side_id, book_odds, line, \
    fanduel_odds, fanduel_link, draftkings_odds, draftkings_link, caesars_odds, caesars_link, \
    betmgm_odds, betmgm_link, espnbet_odds, espnbet_link, fanatics_odds, fanatics_link, \
    bovada_odds, bovada_link";

fn push_odds_values<'a>(qb: &mut QueryBuilder<'a, Postgres>, rows: &'a [OddsRow], now: DateTime<Utc>) {
    qb.push_values(rows, |mut b, row| {
        b.push_bind(&row.event_id)
            .push_bind(&row.odd_id)
            .push_bind(&row.market_name)
            .push_bind(&row.bet_type)
            .push_bind(&row.side_id)
            .push_bind(row.book_odds)
            .push_bind(row.line);
        for book in row.books.all() {
            b.push_bind(book.as_ref().and_then(|q| q.odds))
                .push_bind(book.as_ref().and_then(|q| q.deep_link.clone()));
        }
        b.push_bind(now);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookQuote, GameStatus};

    fn game(id: &str, status: GameStatus, starts_in_minutes: i64, now: DateTime<Utc>) -> Game {
        Game {
            id: id.to_string(),
            league: "NFL".to_string(),
            home_team: "NE Patriots".to_string(),
            away_team: "NY Jets".to_string(),
            home_team_raw: "New England Patriots".to_string(),
            away_team_raw: "New York Jets".to_string(),
            start_time: Some(now + chrono::Duration::minutes(starts_in_minutes)),
            status,
            home_score: None,
            away_score: None,
        }
    }

    fn quote(event_id: &str, odd_id: &str) -> OddsQuote {
        OddsQuote {
            event_id: event_id.to_string(),
            odd_id: odd_id.to_string(),
            market_name: "Moneyline".to_string(),
            side_id: "home".to_string(),
            market: BetMarket::Moneyline,
            book_odds: Some(-125.0),
            books: SportsbookPrices::default(),
        }
    }

    fn bundle(game: Game, odd_ids: &[&str]) -> EventBundle {
        let quotes = odd_ids.iter().map(|odd| quote(&game.id, odd)).collect();
        EventBundle { game, quotes }
    }

    #[test]
    fn lock_window_drops_imminent_games_only() {
        let now = Utc::now();
        let bundles = vec![
            bundle(game("soon", GameStatus::Scheduled, 5, now), &["ml-home"]),
            bundle(game("later", GameStatus::Scheduled, 15, now), &["ml-home"]),
        ];
        let staged = stage_events(bundles, now);
        assert_eq!(staged.skipped_near_start, 1);
        assert_eq!(staged.games.len(), 1);
        assert_eq!(staged.games[0].id, "later");
        assert_eq!(staged.rows.len(), 1);
    }

    #[test]
    fn started_games_survive_staging_for_the_games_upsert() {
        let now = Utc::now();
        let bundles = vec![bundle(
            game("running", GameStatus::Live, -30, now),
            &["ml-home"],
        )];
        let staged = stage_events(bundles, now);
        assert_eq!(staged.skipped_near_start, 0);
        assert_eq!(staged.games.len(), 1);
        assert!(staged.rows[0].game_started);
    }

    #[test]
    fn missing_start_time_is_kept() {
        let now = Utc::now();
        let mut g = game("tba", GameStatus::Scheduled, 0, now);
        g.start_time = None;
        let staged = stage_events(vec![bundle(g, &["ml-home"])], now);
        assert_eq!(staged.games.len(), 1);
    }

    #[test]
    fn split_routes_new_keys_to_both_tables() {
        let now = Utc::now();
        let staged = stage_events(
            vec![bundle(
                game("evt", GameStatus::Scheduled, 60, now),
                &["ml-home", "ml-away"],
            )],
            now,
        );
        let split = split_rows(staged.rows, &HashSet::new());
        assert_eq!(split.opening.len(), 2);
        assert_eq!(split.current.len(), 2);
        assert_eq!(split.frozen, 0);
    }

    #[test]
    fn second_run_inserts_no_new_opening_rows() {
        let now = Utc::now();
        let make_rows = || {
            stage_events(
                vec![bundle(
                    game("evt", GameStatus::Scheduled, 60, now),
                    &["ml-home", "ml-away"],
                )],
                now,
            )
            .rows
        };

        let first = split_rows(make_rows(), &HashSet::new());
        let existing: HashSet<(String, String)> = first
            .opening
            .iter()
            .map(|r| (r.event_id.clone(), r.odd_id.clone()))
            .collect();

        let second = split_rows(make_rows(), &existing);
        assert!(second.opening.is_empty());
        assert_eq!(second.current.len(), 2);
    }

    #[test]
    fn started_game_quotes_are_frozen_out_of_current() {
        let now = Utc::now();
        let staged = stage_events(
            vec![bundle(
                game("evt", GameStatus::Started, -5, now),
                &["ml-home"],
            )],
            now,
        );
        let existing: HashSet<(String, String)> =
            [("evt".to_string(), "ml-home".to_string())].into();
        let split = split_rows(staged.rows, &existing);
        assert!(split.current.is_empty());
        assert!(split.opening.is_empty());
        assert_eq!(split.frozen, 1);
    }

    #[test]
    fn started_game_first_observation_still_opens() {
        let now = Utc::now();
        let staged = stage_events(
            vec![bundle(
                game("evt", GameStatus::Started, -5, now),
                &["ml-home"],
            )],
            now,
        );
        let split = split_rows(staged.rows, &HashSet::new());
        assert_eq!(split.opening.len(), 1);
        assert!(split.current.is_empty());
        assert_eq!(split.frozen, 1);
    }

    #[test]
    fn quote_row_maps_each_market_exhaustively() {
        let now = Utc::now();
        let g = game("evt", GameStatus::Scheduled, 60, now);

        let mut q = quote("evt", "ml-home");
        q.market = BetMarket::Moneyline;
        let row = quote_row(&g, q);
        assert_eq!((row.bet_type.as_str(), row.line), ("ml", None));

        let mut q = quote("evt", "sp-home");
        q.market = BetMarket::Spread { line: Some(-3.5) };
        let row = quote_row(&g, q);
        assert_eq!((row.bet_type.as_str(), row.line), ("sp", Some(-3.5)));

        let mut q = quote("evt", "ou-over");
        q.market = BetMarket::Total { line: Some(47.5) };
        let row = quote_row(&g, q);
        assert_eq!((row.bet_type.as_str(), row.line), ("ou", Some(47.5)));

        let mut q = quote("evt", "yn-yes");
        q.market = BetMarket::Other {
            code: "yn".into(),
            line: Some(1.5),
        };
        let row = quote_row(&g, q);
        assert_eq!((row.bet_type.as_str(), row.line), ("yn", Some(1.5)));
        assert!(!row.game_started);
    }

    #[test]
    fn book_columns_keep_a_stable_order() {
        let mut books = SportsbookPrices::default();
        books.set(
            "bovada",
            BookQuote {
                odds: Some(-105.0),
                deep_link: None,
            },
        );
        let all = books.all();
        assert!(all[..6].iter().all(|b| b.is_none()));
        assert_eq!(all[6].as_ref().unwrap().odds, Some(-105.0));
    }
}
