//! Static league registry.
//!
//! Maps our league codes to the provider's sport/league identifiers. The
//! registry is built once at process start and passed into the orchestrator;
//! an unknown code is a non-retryable configuration error for that league.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeagueMapping {
    pub code: &'static str,
    pub sport_id: &'static str,
    pub league_id: &'static str,
    /// Vendor sport key, kept for cross-referencing other odds feeds.
    pub sport_key: &'static str,
}

/// The leagues processed by every ingestion run, in dispatch order.
pub const SUPPORTED_LEAGUES: [&str; 9] = [
    "NFL", "NBA", "MLB", "NHL", "NCAAF", "NCAAB", "WNBA", "MLS", "UFC",
];

const MAPPINGS: [LeagueMapping; 9] = [
    LeagueMapping {
        code: "NFL",
        sport_id: "FOOTBALL",
        league_id: "NFL",
        sport_key: "americanfootball_nfl",
    },
    LeagueMapping {
        code: "NBA",
        sport_id: "BASKETBALL",
        league_id: "NBA",
        sport_key: "basketball_nba",
    },
    LeagueMapping {
        code: "MLB",
        sport_id: "BASEBALL",
        league_id: "MLB",
        sport_key: "baseball_mlb",
    },
    LeagueMapping {
        code: "NHL",
        sport_id: "HOCKEY",
        league_id: "NHL",
        sport_key: "icehockey_nhl",
    },
    LeagueMapping {
        code: "NCAAF",
        sport_id: "FOOTBALL",
        league_id: "NCAAF",
        sport_key: "americanfootball_ncaaf",
    },
    LeagueMapping {
        code: "NCAAB",
        sport_id: "BASKETBALL",
        league_id: "NCAAB",
        sport_key: "basketball_ncaab",
    },
    LeagueMapping {
        code: "WNBA",
        sport_id: "BASKETBALL",
        league_id: "WNBA",
        sport_key: "basketball_wnba",
    },
    LeagueMapping {
        code: "MLS",
        sport_id: "SOCCER",
        league_id: "MLS",
        sport_key: "soccer_usa_mls",
    },
    LeagueMapping {
        code: "UFC",
        sport_id: "MMA",
        league_id: "UFC",
        sport_key: "mma_mixed_martial_arts",
    },
];

#[derive(Debug, Clone)]
pub struct LeagueRegistry {
    leagues: HashMap<&'static str, LeagueMapping>,
}

impl LeagueRegistry {
    /// The standard nine-league registry.
    pub fn standard() -> Self {
        Self {
            leagues: MAPPINGS.iter().map(|m| (m.code, *m)).collect(),
        }
    }

    pub fn resolve(&self, code: &str) -> Option<&LeagueMapping> {
        self.leagues.get(code)
    }
}
