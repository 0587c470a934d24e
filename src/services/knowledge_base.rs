//! Endpoint Knowledge Base
//!
//! Frozen catalog of the API-Football v3 endpoints the planner can use:
//! parameters, returned sections, enrichment relations and caching
//! policy. Immutable after construction and freely shareable.

use crate::models::{CachePolicy, EndpointDescriptor, Freshness};
use std::collections::HashMap;

/// TTL applied when an endpoint is missing from the catalog (seconds).
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Sentinel: store without expiry.
pub const TTL_NO_EXPIRY: i64 = -1;

/// Sentinel: do not cache.
pub const TTL_SKIP: i64 = 0;

const LONG_TTL_SECS: i64 = 86_400;
const SHORT_TTL_SECS: i64 = 600;
const LIVE_TTL_SECS: i64 = 30;

/// Match statuses after which a fixture's data can never change again.
pub const FINISHED_STATUSES: &[&str] = &["FT", "AET", "PEN", "CANC", "ABD", "AWD", "WO"];

/// Statuses of a match currently being played.
pub const LIVE_STATUSES: &[&str] = &["LIVE", "1H", "2H", "HT", "ET", "BT", "P"];

/// Statuses of a match not started (or on hold).
pub const PREMATCH_STATUSES: &[&str] = &["NS", "TBD", "PST", "SUSP", "INT"];

/// The static endpoint catalog.
pub struct KnowledgeBase {
    endpoints: Vec<EndpointDescriptor>,
    by_name: HashMap<String, usize>,
}

impl KnowledgeBase {
    /// Builds the catalog and checks its invariants: unique names,
    /// `can_replace` referencing existing endpoints, enriched sections
    /// being a subset of returned sections. A violation is a programmer
    /// error and panics at startup.
    pub fn new() -> Self {
        let endpoints = catalog();
        let mut by_name = HashMap::with_capacity(endpoints.len());
        for (i, endpoint) in endpoints.iter().enumerate() {
            let previous = by_name.insert(endpoint.name.clone(), i);
            assert!(previous.is_none(), "duplicate endpoint name: {}", endpoint.name);
            assert!(
                endpoint.enriched_sections.is_subset(&endpoint.returned_sections),
                "{}: enriched sections must be returned sections",
                endpoint.name
            );
        }
        for endpoint in &endpoints {
            for replaced in &endpoint.can_replace {
                assert!(
                    by_name.contains_key(replaced),
                    "{}: can_replace references unknown endpoint {replaced}",
                    endpoint.name
                );
            }
        }
        Self { endpoints, by_name }
    }

    pub fn get(&self, name: &str) -> Option<&EndpointDescriptor> {
        self.by_name.get(name).map(|&i| &self.endpoints[i])
    }

    pub fn all(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    /// Case-insensitive substring search over the per-endpoint use-case
    /// phrases; unique descriptors in catalog insertion order.
    pub fn search_by_use_case(&self, query: &str) -> Vec<&EndpointDescriptor> {
        let needle = query.to_lowercase();
        self.endpoints
            .iter()
            .filter(|e| e.use_cases.iter().any(|u| u.to_lowercase().contains(&needle)))
            .collect()
    }

    /// Endpoints whose single call subsumes several narrower ones.
    pub fn enriched(&self) -> Vec<&EndpointDescriptor> {
        self.endpoints.iter().filter(|e| e.is_enriched).collect()
    }

    /// Effective TTL in seconds for a cache write.
    ///
    /// `TTL_SKIP` (0) means do not cache, `TTL_NO_EXPIRY` (-1) means
    /// store forever. A finished match status forces no-expiry for any
    /// cacheable endpoint: that data can never change again.
    pub fn cache_ttl(&self, name: &str, match_status: Option<&str>) -> i64 {
        let Some(endpoint) = self.get(name) else {
            return DEFAULT_TTL_SECS;
        };

        if endpoint.cache_policy == CachePolicy::NoCache {
            return TTL_SKIP;
        }
        if let Some(status) = match_status
            && FINISHED_STATUSES.contains(&status)
        {
            return TTL_NO_EXPIRY;
        }
        match endpoint.cache_policy {
            CachePolicy::Indefinite => TTL_NO_EXPIRY,
            CachePolicy::LongTtl => LONG_TTL_SECS,
            CachePolicy::ShortTtl => SHORT_TTL_SECS,
            CachePolicy::MatchStatusAdaptive => match match_status {
                Some(status) if LIVE_STATUSES.contains(&status) => LIVE_TTL_SECS,
                Some(status) if PREMATCH_STATUSES.contains(&status) => SHORT_TTL_SECS,
                _ => DEFAULT_TTL_SECS,
            },
            CachePolicy::NoCache => TTL_SKIP,
        }
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Catalog Data
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn endpoint(
    name: &str,
    path: &str,
    required: &[&str],
    optional: &[&str],
    sections: &[&str],
    freshness: Freshness,
    cache_policy: CachePolicy,
    use_cases: &[&str],
) -> EndpointDescriptor {
    EndpointDescriptor {
        name: name.to_string(),
        path: path.to_string(),
        required_params: required.iter().map(|s| (*s).to_string()).collect(),
        optional_params: optional.iter().map(|s| (*s).to_string()).collect(),
        returned_sections: sections.iter().map(|s| (*s).to_string()).collect(),
        is_enriched: false,
        enriched_sections: Default::default(),
        can_replace: vec![],
        freshness,
        cache_policy,
        api_cost: 1,
        use_cases: use_cases.iter().map(|s| (*s).to_string()).collect(),
    }
}

fn enriched(
    mut descriptor: EndpointDescriptor,
    enriched_sections: &[&str],
    can_replace: &[&str],
) -> EndpointDescriptor {
    descriptor.is_enriched = true;
    descriptor.enriched_sections = enriched_sections.iter().map(|s| (*s).to_string()).collect();
    descriptor.can_replace = can_replace.iter().map(|s| (*s).to_string()).collect();
    descriptor
}

fn catalog() -> Vec<EndpointDescriptor> {
    use CachePolicy::*;
    use Freshness::*;

    vec![
        // -------- Reference data --------
        endpoint(
            "countries",
            "/countries",
            &[],
            &["name", "code", "search"],
            &["countries"],
            Static,
            Indefinite,
            &["list countries", "country information"],
        ),
        endpoint(
            "timezones",
            "/timezone",
            &[],
            &[],
            &["timezones"],
            Static,
            Indefinite,
            &["supported timezones"],
        ),
        endpoint(
            "leagues",
            "/leagues",
            &[],
            &["id", "name", "country", "season", "team", "search"],
            &["leagues", "seasons"],
            Seasonal,
            LongTtl,
            &[
                "league information",
                "competition details",
                "resolve league id",
                "season coverage",
            ],
        ),
        endpoint(
            "leagues_seasons",
            "/leagues/seasons",
            &[],
            &[],
            &["seasons"],
            Static,
            Indefinite,
            &["available seasons"],
        ),
        endpoint(
            "venues",
            "/venues",
            &[],
            &["id", "name", "city", "country"],
            &["venues"],
            Static,
            Indefinite,
            &["stadium information", "venue details"],
        ),
        // -------- Teams --------
        endpoint(
            "team_search",
            "/teams",
            &[],
            &["id", "name", "search", "league", "season", "country"],
            &["team", "venue"],
            Seasonal,
            LongTtl,
            &["resolve team id by name", "team search", "team profile", "club information"],
        ),
        endpoint(
            "team_statistics",
            "/teams/statistics",
            &["league", "season", "team"],
            &["date"],
            &["team_statistics", "form"],
            Seasonal,
            ShortTtl,
            &["team statistics", "team performance over a season", "goals scored conceded"],
        ),
        endpoint(
            "team_seasons",
            "/teams/seasons",
            &["team"],
            &[],
            &["seasons"],
            Seasonal,
            LongTtl,
            &["seasons a team is covered for"],
        ),
        endpoint(
            "team_countries",
            "/teams/countries",
            &[],
            &[],
            &["countries"],
            Static,
            Indefinite,
            &["countries with teams"],
        ),
        // -------- Standings --------
        endpoint(
            "standings",
            "/standings",
            &["league", "season"],
            &["team"],
            &["standings"],
            Seasonal,
            ShortTtl,
            &["league standings", "ranking", "classement", "league table"],
        ),
        // -------- Fixtures --------
        endpoint(
            "fixtures_by_date",
            "/fixtures",
            &["date"],
            &["league", "season", "timezone"],
            &["fixtures"],
            MatchBound,
            ShortTtl,
            &["matches on a date", "today's fixtures", "match schedule"],
        ),
        endpoint(
            "fixtures_by_team",
            "/fixtures",
            &["team"],
            &["season", "league", "from", "to", "date", "status", "next", "last"],
            &["fixtures"],
            MatchBound,
            ShortTtl,
            &["resolve fixture id", "find a team's match", "team schedule", "upcoming matches"],
        ),
        endpoint(
            "team_recent_form",
            "/fixtures",
            &["team", "last"],
            &["league", "season", "status"],
            &["form"],
            MatchBound,
            ShortTtl,
            &["recent form", "last matches of a team", "recent results"],
        ),
        endpoint(
            "fixtures_live",
            "/fixtures",
            &["live"],
            &["league", "timezone"],
            &["fixtures", "scores"],
            Live,
            NoCache,
            &["matches in progress", "live scores right now"],
        ),
        enriched(
            endpoint(
                "fixture_details",
                "/fixtures",
                &["id"],
                &["timezone"],
                &["fixture", "events", "lineups", "statistics", "players"],
                MatchBound,
                MatchStatusAdaptive,
                &[
                    "full match details",
                    "complete match analysis",
                    "score of a match",
                    "live match info",
                ],
            ),
            &["events", "lineups", "statistics", "players"],
            &["fixture_events", "fixture_lineups", "fixture_statistics", "fixture_players"],
        ),
        endpoint(
            "fixture_events",
            "/fixtures/events",
            &["fixture"],
            &["team", "player", "type"],
            &["events"],
            MatchBound,
            MatchStatusAdaptive,
            &["match events", "goals and cards timeline"],
        ),
        endpoint(
            "fixture_lineups",
            "/fixtures/lineups",
            &["fixture"],
            &["team", "player", "type"],
            &["lineups"],
            MatchBound,
            MatchStatusAdaptive,
            &["match lineups", "starting eleven", "formations"],
        ),
        endpoint(
            "fixture_statistics",
            "/fixtures/statistics",
            &["fixture"],
            &["team", "type"],
            &["statistics"],
            MatchBound,
            MatchStatusAdaptive,
            &["match statistics", "possession shots corners"],
        ),
        endpoint(
            "fixture_players",
            "/fixtures/players",
            &["fixture"],
            &["team"],
            &["players"],
            MatchBound,
            MatchStatusAdaptive,
            &["player match ratings", "player performance in a match"],
        ),
        endpoint(
            "head_to_head",
            "/fixtures/headtohead",
            &["h2h"],
            &["date", "league", "season", "last", "next", "from", "to", "status"],
            &["h2h"],
            MatchBound,
            LongTtl,
            &["head to head history", "past meetings between two teams", "h2h record"],
        ),
        enriched(
            endpoint(
                "predictions",
                "/predictions",
                &["fixture"],
                &[],
                &["predictions", "comparison", "h2h", "form"],
                MatchBound,
                ShortTtl,
                &["match prediction", "who will win", "pre-match comparison", "match odds advice"],
            ),
            &["h2h", "form"],
            &["head_to_head", "team_recent_form"],
        ),
        // -------- Players --------
        endpoint(
            "player_search",
            "/players",
            &["search"],
            &["league", "season", "page"],
            &["player"],
            Seasonal,
            LongTtl,
            &["resolve player id by name", "player search", "player profile"],
        ),
        endpoint(
            "player_statistics",
            "/players",
            &["id", "season"],
            &["league"],
            &["player", "player_statistics"],
            Seasonal,
            ShortTtl,
            &["player statistics", "goals and assists of a player", "player season stats"],
        ),
        endpoint(
            "player_squads",
            "/players/squads",
            &["team"],
            &[],
            &["squad"],
            Seasonal,
            LongTtl,
            &["team squad", "roster", "list of players in a team"],
        ),
        endpoint(
            "top_scorers",
            "/players/topscorers",
            &["league", "season"],
            &[],
            &["top_scorers"],
            Seasonal,
            LongTtl,
            &["top scorers", "best goalscorers in a league", "meilleurs buteurs"],
        ),
        endpoint(
            "top_assists",
            "/players/topassists",
            &["league", "season"],
            &[],
            &["top_assists"],
            Seasonal,
            LongTtl,
            &["top assists", "best passers in a league"],
        ),
        endpoint(
            "top_yellow_cards",
            "/players/topyellowcards",
            &["league", "season"],
            &[],
            &["top_yellow_cards"],
            Seasonal,
            LongTtl,
            &["most yellow cards"],
        ),
        endpoint(
            "top_red_cards",
            "/players/topredcards",
            &["league", "season"],
            &[],
            &["top_red_cards"],
            Seasonal,
            LongTtl,
            &["most red cards"],
        ),
        // -------- Misc --------
        endpoint(
            "transfers",
            "/transfers",
            &[],
            &["player", "team"],
            &["transfers"],
            Seasonal,
            LongTtl,
            &["transfer history", "transfer news for a player or team"],
        ),
        endpoint(
            "trophies",
            "/trophies",
            &[],
            &["player", "coach"],
            &["trophies"],
            Static,
            Indefinite,
            &["trophies won", "honours list"],
        ),
        endpoint(
            "sidelined",
            "/sidelined",
            &[],
            &["player", "coach"],
            &["sidelined"],
            Seasonal,
            LongTtl,
            &["absence history", "suspension history"],
        ),
        endpoint(
            "injuries",
            "/injuries",
            &[],
            &["league", "season", "fixture", "team", "player", "date"],
            &["injuries"],
            MatchBound,
            ShortTtl,
            &["injured players", "injury list before a match"],
        ),
        endpoint(
            "coaches",
            "/coachs",
            &[],
            &["id", "team", "search"],
            &["coach"],
            Seasonal,
            LongTtl,
            &["coach information", "who manages a team"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_size_and_invariants() {
        let kb = KnowledgeBase::new();
        assert!(kb.all().len() >= 30, "catalog has {} endpoints", kb.all().len());
    }

    #[test]
    fn test_get_known_and_unknown() {
        let kb = KnowledgeBase::new();
        assert!(kb.get("fixture_details").is_some());
        assert!(kb.get("no_such_endpoint").is_none());
    }

    #[test]
    fn test_two_enriched_composites() {
        let kb = KnowledgeBase::new();
        let enriched: Vec<&str> = kb.enriched().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(enriched, vec!["fixture_details", "predictions"]);

        let details = kb.get("fixture_details").unwrap();
        for section in ["events", "lineups", "statistics", "players"] {
            assert!(details.enriched_sections.contains(section));
        }
        let predictions = kb.get("predictions").unwrap();
        assert!(predictions.enriched_sections.contains("h2h"));
        assert!(predictions.enriched_sections.contains("form"));
    }

    #[test]
    fn test_search_by_use_case() {
        let kb = KnowledgeBase::new();
        let hits = kb.search_by_use_case("head to head");
        assert!(hits.iter().any(|e| e.name == "head_to_head"));

        let hits = kb.search_by_use_case("RESOLVE TEAM ID");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "team_search");
    }

    #[test]
    fn test_ttl_rules() {
        let kb = KnowledgeBase::new();

        // No-cache endpoints never store
        assert_eq!(kb.cache_ttl("fixtures_live", None), TTL_SKIP);
        assert_eq!(kb.cache_ttl("fixtures_live", Some("FT")), TTL_SKIP);

        // Indefinite and finished matches store forever
        assert_eq!(kb.cache_ttl("countries", None), TTL_NO_EXPIRY);
        assert_eq!(kb.cache_ttl("fixture_details", Some("FT")), TTL_NO_EXPIRY);
        assert_eq!(kb.cache_ttl("head_to_head", Some("AET")), TTL_NO_EXPIRY);

        // Fixed policies
        assert_eq!(kb.cache_ttl("team_search", None), 86_400);
        assert_eq!(kb.cache_ttl("standings", None), 600);

        // Adaptive: live vs pre-match
        assert_eq!(kb.cache_ttl("fixture_details", Some("1H")), 30);
        assert_eq!(kb.cache_ttl("fixture_details", Some("HT")), 30);
        assert_eq!(kb.cache_ttl("fixture_details", Some("NS")), 600);
        assert_eq!(kb.cache_ttl("fixture_details", None), DEFAULT_TTL_SECS);

        // Unknown endpoint gets the default
        assert_eq!(kb.cache_ttl("mystery", None), DEFAULT_TTL_SECS);
    }
}
