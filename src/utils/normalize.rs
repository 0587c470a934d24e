//! Entity Normalization
//!
//! Canonical forms for team, league, player and date strings. This is
//! the foundation of cache-key idempotence: two spellings of the same
//! thing must normalize to the same token before any key is built.
//!
//! Alias dictionaries are data, not code: they ship as an embedded
//! TOML document parsed once on first use.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

// ============================================================================
// Alias Tables
// ============================================================================

/// One club with its canonical slug and the spellings users type.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamEntry {
    pub canonical: String,
    pub name: String,
    pub aliases: Vec<String>,
}

/// One league/competition, with the API-Football league id.
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueEntry {
    pub canonical: String,
    pub name: String,
    pub api_id: i64,
    pub aliases: Vec<String>,
}

/// One well-known player.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerEntry {
    pub canonical: String,
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AliasData {
    teams: Vec<TeamEntry>,
    leagues: Vec<LeagueEntry>,
    players: Vec<PlayerEntry>,
}

struct AliasIndex {
    data: AliasData,
    /// normalized alias -> index into data.teams
    team_lookup: HashMap<String, usize>,
    league_lookup: HashMap<String, usize>,
    player_lookup: HashMap<String, usize>,
}

static ALIASES: Lazy<AliasIndex> = Lazy::new(|| {
    let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/aliases.toml"));
    let data: AliasData = toml::from_str(raw).expect("embedded alias table is malformed");

    let mut team_lookup = HashMap::new();
    for (i, team) in data.teams.iter().enumerate() {
        team_lookup.insert(normalize_token(&team.canonical), i);
        for alias in &team.aliases {
            team_lookup.insert(normalize_token(alias), i);
        }
    }
    let mut league_lookup = HashMap::new();
    for (i, league) in data.leagues.iter().enumerate() {
        league_lookup.insert(normalize_token(&league.canonical), i);
        for alias in &league.aliases {
            league_lookup.insert(normalize_token(alias), i);
        }
    }
    let mut player_lookup = HashMap::new();
    for (i, player) in data.players.iter().enumerate() {
        player_lookup.insert(normalize_token(&player.canonical), i);
        for alias in &player.aliases {
            player_lookup.insert(normalize_token(alias), i);
        }
    }

    AliasIndex { data, team_lookup, league_lookup, player_lookup }
});

pub fn team_entries() -> &'static [TeamEntry] {
    &ALIASES.data.teams
}

pub fn league_entries() -> &'static [LeagueEntry] {
    &ALIASES.data.leagues
}

pub fn player_entries() -> &'static [PlayerEntry] {
    &ALIASES.data.players
}

/// Looks a team up by any known alias.
pub fn find_team(input: &str) -> Option<&'static TeamEntry> {
    ALIASES
        .team_lookup
        .get(&normalize_token(input))
        .map(|&i| &ALIASES.data.teams[i])
}

pub fn find_league(input: &str) -> Option<&'static LeagueEntry> {
    ALIASES
        .league_lookup
        .get(&normalize_token(input))
        .map(|&i| &ALIASES.data.leagues[i])
}

pub fn find_player(input: &str) -> Option<&'static PlayerEntry> {
    ALIASES
        .player_lookup
        .get(&normalize_token(input))
        .map(|&i| &ALIASES.data.players[i])
}

// ============================================================================
// String Normalization
// ============================================================================

/// Drops diacritics: `Atlético` -> `Atletico`.
pub fn strip_accents(input: &str) -> String {
    input.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Generic normalizer: lowercase, accent-free, punctuation and spaces
/// reduced to single underscores.
pub fn normalize_token(input: &str) -> String {
    let folded = strip_accents(input).to_lowercase();
    let mut out = String::with_capacity(folded.len());
    let mut last_was_sep = true;
    for c in folded.chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Canonical team token: alias table first, generic normalizer for
/// unknown clubs.
pub fn normalize_team(input: &str) -> String {
    match find_team(input) {
        Some(team) => team.canonical.clone(),
        None => normalize_token(input),
    }
}

/// Canonical league token.
pub fn normalize_league(input: &str) -> String {
    match find_league(input) {
        Some(league) => league.canonical.clone(),
        None => normalize_token(input),
    }
}

/// Player names: accent-stripped, lower-cased, spaces to underscores.
pub fn normalize_player(input: &str) -> String {
    match find_player(input) {
        Some(player) => player.canonical.clone(),
        None => normalize_token(input),
    }
}

/// Orders a `team1-team2` pair so both directions collide.
pub fn normalize_h2h(input: &str) -> String {
    let mut sides: Vec<String> = input.split('-').map(|s| normalize_team(s.trim())).collect();
    sides.sort();
    sides.join("-")
}

// ============================================================================
// Dates
// ============================================================================

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m-%d-%Y"];

/// Renders any accepted date spelling as ISO `YYYY-MM-DD`.
pub fn normalize_date(input: &str) -> Option<String> {
    let trimmed = input.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}
