//! Endpoint Catalog Models
//!
//! Descriptors for the upstream API-Football v3 endpoints. The knowledge
//! base owns a frozen catalog of these; everything else borrows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How quickly an endpoint's data goes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Never changes (countries, timezones, historical seasons)
    Static,
    /// Changes over a season (standings, squads, top scorers)
    Seasonal,
    /// Bound to a specific fixture's lifecycle
    MatchBound,
    /// Changes second to second while a match is running
    Live,
}

/// Caching policy attached to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Store without expiry
    Indefinite,
    /// 24 hours
    LongTtl,
    /// 10 minutes
    ShortTtl,
    /// Never cached
    NoCache,
    /// TTL depends on the match status carried by the response
    MatchStatusAdaptive,
}

impl CachePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Indefinite => "indefinite",
            Self::LongTtl => "long_ttl",
            Self::ShortTtl => "short_ttl",
            Self::NoCache => "no_cache",
            Self::MatchStatusAdaptive => "match_status_adaptive",
        }
    }
}

/// One upstream endpoint as the planner sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Unique catalog key, e.g. `fixture_details`
    pub name: String,
    /// Path template with `{param}` holes, e.g. `/fixtures/headtohead`
    pub path: String,
    /// Parameters the upstream rejects the call without
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    /// Data labels this endpoint populates (`events`, `lineups`, ...)
    pub returned_sections: BTreeSet<String>,
    /// True when one call here subsumes several narrower endpoints
    pub is_enriched: bool,
    /// Sections that would otherwise need separate endpoints
    pub enriched_sections: BTreeSet<String>,
    /// Endpoints made redundant when this one is chosen
    pub can_replace: Vec<String>,
    pub freshness: Freshness,
    pub cache_policy: CachePolicy,
    /// Planning heuristic only, default 1
    pub api_cost: u32,
    /// Human-written phrases matched by `search_by_use_case`
    pub use_cases: Vec<String>,
}

impl EndpointDescriptor {
    /// True when every section in `sections` is covered by this
    /// endpoint's enrichment.
    pub fn covers_sections(&self, sections: &BTreeSet<String>) -> bool {
        self.is_enriched && sections.is_subset(&self.enriched_sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_covers_sections() {
        let descriptor = EndpointDescriptor {
            name: "fixture_details".to_string(),
            path: "/fixtures".to_string(),
            required_params: vec!["id".to_string()],
            optional_params: vec![],
            returned_sections: sections(&["events", "lineups", "statistics", "players"]),
            is_enriched: true,
            enriched_sections: sections(&["events", "lineups", "statistics", "players"]),
            can_replace: vec![],
            freshness: Freshness::MatchBound,
            cache_policy: CachePolicy::MatchStatusAdaptive,
            api_cost: 1,
            use_cases: vec![],
        };

        assert!(descriptor.covers_sections(&sections(&["events", "lineups"])));
        assert!(!descriptor.covers_sections(&sections(&["events", "standings"])));
    }

    #[test]
    fn test_non_enriched_covers_nothing() {
        let descriptor = EndpointDescriptor {
            name: "fixture_events".to_string(),
            path: "/fixtures/events".to_string(),
            required_params: vec!["fixture".to_string()],
            optional_params: vec![],
            returned_sections: sections(&["events"]),
            is_enriched: false,
            enriched_sections: BTreeSet::new(),
            can_replace: vec![],
            freshness: Freshness::MatchBound,
            cache_policy: CachePolicy::MatchStatusAdaptive,
            api_cost: 1,
            use_cases: vec![],
        };

        assert!(!descriptor.covers_sections(&sections(&["events"])));
    }
}
