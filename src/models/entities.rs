//! Question Understanding Models
//!
//! Entities extracted from a user question, the closed question-type
//! enumeration with its slot requirements, and the validator's output.

use serde::{Deserialize, Serialize};

// ============================================================================
// Language
// ============================================================================

/// Languages the validator detects and localizes clarifications in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Fr,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fr => "fr",
            Self::En => "en",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fr" | "french" | "francais" | "français" => Some(Self::Fr),
            "en" | "english" | "anglais" => Some(Self::En),
            _ => None,
        }
    }
}

// ============================================================================
// Extracted Entities
// ============================================================================

/// One recognized entity, kept both as written and in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    /// Canonical form after normalization (alias table, accent folding;
    /// ISO date for date mentions)
    pub canonical: String,
    /// The text as it appeared in the question or caller context
    pub mentioned: String,
}

impl EntityMention {
    pub fn new(canonical: impl Into<String>, mentioned: impl Into<String>) -> Self {
        Self { canonical: canonical.into(), mentioned: mentioned.into() }
    }
}

/// Everything the validator recognized in the question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedEntities {
    /// Ordered as mentioned; at most 2 matter for head-to-head intents
    pub teams: Vec<EntityMention>,
    pub players: Vec<EntityMention>,
    pub leagues: Vec<EntityMention>,
    /// Canonical form is always `YYYY-MM-DD`
    pub dates: Vec<EntityMention>,
    pub detected_language: Language,
}

// ============================================================================
// Question Classification
// ============================================================================

/// Closed set of question intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MatchLiveInfo,
    MatchPrediction,
    TeamComparison,
    TeamStats,
    PlayerInfo,
    LeagueInfo,
    HeadToHead,
    Standings,
    Unknown,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchLiveInfo => "match_live_info",
            Self::MatchPrediction => "match_prediction",
            Self::TeamComparison => "team_comparison",
            Self::TeamStats => "team_stats",
            Self::PlayerInfo => "player_info",
            Self::LeagueInfo => "league_info",
            Self::HeadToHead => "head_to_head",
            Self::Standings => "standings",
            Self::Unknown => "unknown",
        }
    }

    /// Slot requirements for the completeness check.
    ///
    /// `TeamComparison` and `HeadToHead` need exactly two teams; with one
    /// team present the missing slot is reported as `second_team`.
    pub fn required_slots(&self) -> &'static [Slot] {
        match self {
            Self::MatchLiveInfo | Self::MatchPrediction | Self::TeamStats => &[Slot::Teams],
            Self::TeamComparison | Self::HeadToHead => &[Slot::Teams, Slot::SecondTeam],
            Self::PlayerInfo => &[Slot::Players],
            Self::LeagueInfo | Self::Standings => &[Slot::Leagues],
            Self::Unknown => &[Slot::QuestionType],
        }
    }
}

/// Named slots the completeness check can report as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Teams,
    SecondTeam,
    Players,
    Leagues,
    Dates,
    QuestionType,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teams => "teams",
            Self::SecondTeam => "second_team",
            Self::Players => "players",
            Self::Leagues => "leagues",
            Self::Dates => "dates",
            Self::QuestionType => "question_type",
        }
    }
}

// ============================================================================
// Caller-Supplied Context
// ============================================================================

/// Values pinned out-of-band by the caller (e.g. a league selector).
///
/// Anything set here satisfies the corresponding slot and dominates
/// entities extracted from the question text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredContext {
    pub zone: Option<String>,
    pub league: Option<String>,
    pub league_id: Option<i64>,
    pub team: Option<String>,
    pub team_id: Option<i64>,
    pub player: Option<String>,
    pub player_id: Option<i64>,
    pub fixture: Option<String>,
    pub fixture_id: Option<i64>,
    pub season: Option<i32>,
    /// Overrides language detection when set
    pub language: Option<Language>,
}

impl StructuredContext {
    pub fn is_empty(&self) -> bool {
        self.zone.is_none()
            && self.league.is_none()
            && self.league_id.is_none()
            && self.team.is_none()
            && self.team_id.is_none()
            && self.player.is_none()
            && self.player_id.is_none()
            && self.fixture.is_none()
            && self.fixture_id.is_none()
            && self.season.is_none()
            && self.language.is_none()
    }

    pub fn has_team(&self) -> bool {
        self.team.is_some() || self.team_id.is_some()
    }

    pub fn has_league(&self) -> bool {
        self.league.is_some() || self.league_id.is_some()
    }

    pub fn has_player(&self) -> bool {
        self.player.is_some() || self.player_id.is_some()
    }

    pub fn has_fixture(&self) -> bool {
        self.fixture.is_some() || self.fixture_id.is_some()
    }
}

// ============================================================================
// Validation Result
// ============================================================================

/// Output of the question validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_complete: bool,
    /// Named slots still unfilled after context override
    pub missing_info: Vec<Slot>,
    /// One localized question per missing slot
    pub clarification_questions: Vec<String>,
    /// Classification confidence in [0, 1]
    pub confidence: f64,
    pub question_type: QuestionType,
    pub entities: ExtractedEntities,
    pub language: Language,
}

impl ValidationResult {
    /// Generic fallback when the validator cannot make sense of anything.
    pub fn unparseable(language: Language, clarification: String) -> Self {
        Self {
            is_complete: false,
            missing_info: vec![Slot::QuestionType],
            clarification_questions: vec![clarification],
            confidence: 0.0,
            question_type: QuestionType::Unknown,
            entities: ExtractedEntities { detected_language: language, ..Default::default() },
            language,
        }
    }
}
