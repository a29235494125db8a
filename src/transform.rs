//! Vendor payload to internal model conversion.
//!
//! All sanitization lives here: prices are parsed from numbers or strings,
//! clamped to the storable range and rounded to two decimals; text bound for
//! fixed-width columns is truncated; team names get a stable display form.
//! A malformed event never aborts its batch - the caller drops it and
//! continues with the rest.

use serde_json::Value;

use crate::config::{PRICE_CAP, TEXT_COLUMN_WIDTH};
use crate::error::{PipelineError, Result};
use crate::fetcher::{RawEvent, RawOddsEntry, RawStatus, RawTeam};
use crate::models::{BetMarket, BookQuote, Game, GameStatus, OddsQuote, SportsbookPrices};

/// Display-name overrides for teams whose full names are unwieldy or
/// inconsistent across feeds. Fallback is whitespace collapse of the raw
/// name. Display stability for downstream matching, not correctness.
const TEAM_DISPLAY_OVERRIDES: &[(&str, &str)] = &[
    ("New York Yankees", "NY Yankees"),
    ("New York Mets", "NY Mets"),
    ("New York Giants", "NY Giants"),
    ("New York Jets", "NY Jets"),
    ("New York Knicks", "NY Knicks"),
    ("New York Rangers", "NY Rangers"),
    ("New York Islanders", "NY Islanders"),
    ("New York Red Bulls", "NY Red Bulls"),
    ("New England Patriots", "NE Patriots"),
    ("New England Revolution", "NE Revolution"),
    ("Los Angeles Dodgers", "LA Dodgers"),
    ("Los Angeles Angels", "LA Angels"),
    ("Los Angeles Lakers", "LA Lakers"),
    ("Los Angeles Clippers", "LA Clippers"),
    ("Los Angeles Rams", "LA Rams"),
    ("Los Angeles Chargers", "LA Chargers"),
    ("Los Angeles Kings", "LA Kings"),
    ("Los Angeles Galaxy", "LA Galaxy"),
    ("Golden State Warriors", "GS Warriors"),
    ("San Francisco 49ers", "SF 49ers"),
    ("San Francisco Giants", "SF Giants"),
    ("San Jose Sharks", "SJ Sharks"),
    ("San Jose Earthquakes", "SJ Earthquakes"),
    ("Tampa Bay Buccaneers", "TB Buccaneers"),
    ("Tampa Bay Rays", "TB Rays"),
    ("Tampa Bay Lightning", "TB Lightning"),
];

/// Convert one raw provider event into a game plus its odds quotes.
pub fn transform_event(raw: &RawEvent, league_code: &str) -> Result<(Game, Vec<OddsQuote>)> {
    if raw.event_id.trim().is_empty() {
        return Err(PipelineError::Transform("event without an eventID".into()));
    }

    let home_raw = team_name(&raw.teams.home, "Unknown Home Team");
    let away_raw = team_name(&raw.teams.away, "Unknown Away Team");

    let game = Game {
        id: raw.event_id.clone(),
        league: league_code.to_string(),
        home_team: display_name(&home_raw),
        away_team: display_name(&away_raw),
        home_team_raw: home_raw,
        away_team_raw: away_raw,
        start_time: raw.status.starts_at,
        status: status_of(&raw.status),
        home_score: raw.status.home_score,
        away_score: raw.status.away_score,
    };

    let mut quotes: Vec<OddsQuote> = raw
        .odds
        .iter()
        .map(|(odd_id, entry)| build_quote(&raw.event_id, odd_id, entry))
        .collect();
    // HashMap iteration order is arbitrary; keep output stable for batching.
    quotes.sort_by(|a, b| a.odd_id.cmp(&b.odd_id));

    Ok((game, quotes))
}

fn status_of(status: &RawStatus) -> GameStatus {
    if status.completed || status.cancelled {
        GameStatus::Final
    } else if status.live {
        GameStatus::Live
    } else if status.started {
        GameStatus::Started
    } else {
        GameStatus::Scheduled
    }
}

fn build_quote(event_id: &str, odd_id: &str, entry: &RawOddsEntry) -> OddsQuote {
    let bet_code = truncate(entry.bet_type_id.as_deref().unwrap_or(""), TEXT_COLUMN_WIDTH);

    let market = match bet_code.as_str() {
        "ml" => BetMarket::Moneyline,
        "sp" => BetMarket::Spread {
            line: first_price(&[&entry.book_spread, &entry.fair_spread]),
        },
        "ou" => BetMarket::Total {
            line: first_price(&[&entry.book_over_under, &entry.fair_over_under]),
        },
        _ => BetMarket::Other {
            code: bet_code,
            line: first_price(&[
                &entry.book_spread,
                &entry.fair_spread,
                &entry.book_over_under,
                &entry.fair_over_under,
            ]),
        },
    };

    let mut books = SportsbookPrices::default();
    for (book, raw) in &entry.by_bookmaker {
        books.set(
            book,
            BookQuote {
                odds: sanitize_price(raw.book_odds.as_ref()),
                deep_link: raw.deep_link.clone(),
            },
        );
    }

    OddsQuote {
        event_id: event_id.to_string(),
        odd_id: truncate(odd_id, TEXT_COLUMN_WIDTH),
        market_name: truncate(entry.market_name.as_deref().unwrap_or(""), TEXT_COLUMN_WIDTH),
        side_id: truncate(entry.side_id.as_deref().unwrap_or(""), TEXT_COLUMN_WIDTH),
        market,
        book_odds: sanitize_price(entry.book_odds.as_ref())
            .or_else(|| sanitize_price(entry.fair_odds.as_ref())),
        books,
    }
}

/// Parse a price from a JSON number or string, clamp it to the storable
/// range, and round to two decimals. Non-numeric or absent values become
/// None, never zero.
pub fn sanitize_price(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if !parsed.is_finite() {
        return None;
    }
    Some((parsed.clamp(-PRICE_CAP, PRICE_CAP) * 100.0).round() / 100.0)
}

fn first_price(candidates: &[&Option<Value>]) -> Option<f64> {
    candidates
        .iter()
        .find_map(|value| sanitize_price(value.as_ref()))
}

/// Truncate to a character count, for fixed-width columns.
pub fn truncate(input: &str, max_chars: usize) -> String {
    let trimmed = input.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        trimmed.chars().take(max_chars).collect()
    }
}

fn team_name(team: &Option<RawTeam>, fallback: &str) -> String {
    team.as_ref()
        .and_then(|t| {
            t.names
                .long
                .as_deref()
                .or(t.names.medium.as_deref())
                .or(t.names.short.as_deref())
        })
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

fn display_name(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    for (full, short) in TEAM_DISPLAY_OVERRIDES {
        if collapsed.eq_ignore_ascii_case(full) {
            return (*short).to_string();
        }
    }
    collapsed
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fetcher::{RawBookOdds, RawTeamNames, RawTeams};

    fn raw_event(id: &str) -> RawEvent {
        RawEvent {
            event_id: id.to_string(),
            teams: RawTeams {
                home: Some(RawTeam {
                    names: RawTeamNames {
                        long: Some("New York Yankees".into()),
                        ..RawTeamNames::default()
                    },
                }),
                away: Some(RawTeam {
                    names: RawTeamNames {
                        long: Some("Boston   Red  Sox".into()),
                        ..RawTeamNames::default()
                    },
                }),
            },
            ..RawEvent::default()
        }
    }

    fn entry(bet_type: &str) -> RawOddsEntry {
        RawOddsEntry {
            market_name: Some("Point Spread".into()),
            bet_type_id: Some(bet_type.into()),
            side_id: Some("home".into()),
            ..RawOddsEntry::default()
        }
    }

    #[test]
    fn prices_clamp_round_and_reject_garbage() {
        assert_eq!(sanitize_price(Some(&json!("-15000"))), Some(-9999.99));
        assert_eq!(sanitize_price(Some(&json!(15000.0))), Some(9999.99));
        assert_eq!(sanitize_price(Some(&json!("abc"))), None);
        assert_eq!(sanitize_price(Some(&json!(null))), None);
        assert_eq!(sanitize_price(None), None);
        assert_eq!(sanitize_price(Some(&json!("-110.456"))), Some(-110.46));
        assert_eq!(sanitize_price(Some(&json!(2.5))), Some(2.5));
    }

    #[test]
    fn text_truncates_to_column_width() {
        let long = "x".repeat(80);
        assert_eq!(truncate(&long, TEXT_COLUMN_WIDTH).chars().count(), 50);
        assert_eq!(truncate("  spread  ", TEXT_COLUMN_WIDTH), "spread");
    }

    #[test]
    fn display_names_use_overrides_then_collapse() {
        assert_eq!(display_name("New York Yankees"), "NY Yankees");
        assert_eq!(display_name("  Boston   Red Sox "), "Boston Red Sox");
        assert_eq!(display_name("los angeles dodgers"), "LA Dodgers");
    }

    #[test]
    fn missing_teams_get_placeholders() {
        let mut raw = raw_event("evt-1");
        raw.teams = RawTeams::default();
        let (game, _) = transform_event(&raw, "MLB").unwrap();
        assert_eq!(game.home_team_raw, "Unknown Home Team");
        assert_eq!(game.away_team_raw, "Unknown Away Team");
        assert_eq!(game.home_team, "Unknown Home Team");
    }

    #[test]
    fn event_without_id_is_rejected() {
        let raw = raw_event("   ");
        let err = transform_event(&raw, "MLB").unwrap_err();
        assert!(matches!(err, PipelineError::Transform(_)));
    }

    #[test]
    fn spread_line_prefers_book_over_fair() {
        let mut spread = entry("sp");
        spread.book_spread = Some(json!("-3.5"));
        spread.fair_spread = Some(json!("-4"));
        let quote = build_quote("evt-1", "sp-home", &spread);
        assert_eq!(quote.market, BetMarket::Spread { line: Some(-3.5) });

        let mut fair_only = entry("sp");
        fair_only.fair_spread = Some(json!("-4"));
        let quote = build_quote("evt-1", "sp-home", &fair_only);
        assert_eq!(quote.market, BetMarket::Spread { line: Some(-4.0) });
    }

    #[test]
    fn total_line_prefers_book_over_under() {
        let mut total = entry("ou");
        total.book_over_under = Some(json!(47.5));
        total.fair_over_under = Some(json!(48.0));
        let quote = build_quote("evt-1", "ou-over", &total);
        assert_eq!(quote.market, BetMarket::Total { line: Some(47.5) });
    }

    #[test]
    fn moneyline_never_carries_a_line() {
        let mut ml = entry("ml");
        ml.book_spread = Some(json!("-3.5"));
        ml.book_odds = Some(json!("-125"));
        let quote = build_quote("evt-1", "ml-home", &ml);
        assert_eq!(quote.market, BetMarket::Moneyline);
        assert_eq!(quote.book_odds, Some(-125.0));
    }

    #[test]
    fn unknown_bet_type_tries_spread_then_total_fields() {
        let mut other = entry("yn");
        other.book_over_under = Some(json!(1.5));
        let quote = build_quote("evt-1", "yn-yes", &other);
        assert_eq!(
            quote.market,
            BetMarket::Other {
                code: "yn".into(),
                line: Some(1.5)
            }
        );

        let mut other = entry("yn");
        other.book_spread = Some(json!(0.5));
        other.book_over_under = Some(json!(1.5));
        let quote = build_quote("evt-1", "yn-yes", &other);
        assert_eq!(
            quote.market,
            BetMarket::Other {
                code: "yn".into(),
                line: Some(0.5)
            }
        );
    }

    #[test]
    fn book_odds_fall_back_to_fair_odds() {
        let mut ml = entry("ml");
        ml.fair_odds = Some(json!("-118"));
        let quote = build_quote("evt-1", "ml-home", &ml);
        assert_eq!(quote.book_odds, Some(-118.0));
    }

    #[test]
    fn only_whitelisted_books_are_flattened() {
        let mut ml = entry("ml");
        ml.by_bookmaker.insert(
            "fanduel".into(),
            RawBookOdds {
                book_odds: Some(json!("-128")),
                deep_link: Some("https://fd.example/bet".into()),
            },
        );
        ml.by_bookmaker.insert(
            "pinnacle".into(),
            RawBookOdds {
                book_odds: Some(json!("-120")),
                deep_link: None,
            },
        );
        let quote = build_quote("evt-1", "ml-home", &ml);
        let fanduel = quote.books.fanduel.as_ref().unwrap();
        assert_eq!(fanduel.odds, Some(-128.0));
        assert_eq!(fanduel.deep_link.as_deref(), Some("https://fd.example/bet"));
        assert_eq!(quote.books.all().iter().filter(|b| b.is_some()).count(), 1);
    }

    #[test]
    fn status_mapping_follows_lifecycle_flags() {
        let mut status = RawStatus::default();
        assert_eq!(status_of(&status), GameStatus::Scheduled);
        status.started = true;
        assert_eq!(status_of(&status), GameStatus::Started);
        status.live = true;
        assert_eq!(status_of(&status), GameStatus::Live);
        status.completed = true;
        assert_eq!(status_of(&status), GameStatus::Final);

        let cancelled = RawStatus {
            cancelled: true,
            ..RawStatus::default()
        };
        assert_eq!(status_of(&cancelled), GameStatus::Final);
    }

    #[test]
    fn transform_produces_sorted_quotes() {
        let mut raw = raw_event("evt-9");
        raw.odds.insert("b-side".into(), entry("ml"));
        raw.odds.insert("a-side".into(), entry("ml"));
        let (game, quotes) = transform_event(&raw, "MLB").unwrap();
        assert_eq!(game.home_team, "NY Yankees");
        assert_eq!(game.away_team, "Boston Red Sox");
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].odd_id, "a-side");
        assert_eq!(quotes[1].odd_id, "b-side");
        assert!(quotes.iter().all(|q| q.event_id == "evt-9"));
    }
}
