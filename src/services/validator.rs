//! Question Validator
//!
//! Turns a raw question plus optional caller context into a
//! `ValidationResult`: detected language, extracted entities, question
//! classification, completeness check and localized clarifications.
//!
//! Recognition is dictionary + pattern based on purpose; there is no
//! statistical model here.

use crate::metrics::PipelineMetrics;
use crate::models::{
    EntityMention, ExtractedEntities, Language, QuestionType, Slot, StructuredContext,
    ValidationResult,
};
use crate::utils::normalize::{
    find_league, find_player, find_team, league_entries, normalize_date, normalize_player,
    player_entries, strip_accents, team_entries,
};
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

// ============================================================================
// Language Detection
// ============================================================================

const FR_KEYWORDS: &[&str] = &[
    "quel", "quelle", "quels", "quelles", "qui", "quoi", "comment", "pourquoi", "ou", "est",
    "sont", "le", "la", "les", "un", "une", "des", "du", "de", "et", "contre", "equipe", "joueur",
    "classement", "resultat", "aujourd", "demain", "hier", "prochain", "dernier", "buts",
];

const EN_KEYWORDS: &[&str] = &[
    "what", "which", "who", "when", "where", "how", "why", "is", "are", "the", "an", "of", "and",
    "or", "versus", "team", "player", "standings", "today", "tomorrow", "yesterday", "next",
    "last", "will", "win", "goals", "against",
];

// ============================================================================
// Classification Keywords (accent-folded, lowercase)
// ============================================================================

const CLASS_KEYWORDS: &[(QuestionType, &[&str])] = &[
    (
        QuestionType::MatchLiveInfo,
        &["score", "live", "en direct", "direct", "resultat", "analyse", "match", "mi-temps"],
    ),
    (
        QuestionType::MatchPrediction,
        &["prediction", "pronostic", "qui va gagner", "who will win", "gagner", "cote", "odds", "favori"],
    ),
    (
        QuestionType::TeamComparison,
        &["comparaison", "comparer", "compare", "vs", "versus", "mieux que", "better than", "plus fort"],
    ),
    (
        QuestionType::TeamStats,
        &["statistiques", "stats", "statistics", "performance", "forme", "form", "buts marques", "goals scored"],
    ),
    (
        QuestionType::PlayerInfo,
        &["joueur", "player", "buteur", "scorer", "buts de", "goals of", "assists", "passes decisives"],
    ),
    (
        QuestionType::LeagueInfo,
        &["championnat", "competition", "saison", "season", "informations", "equipes de", "teams in"],
    ),
    (
        QuestionType::HeadToHead,
        &["h2h", "head to head", "face a face", "historique", "confrontation", "confrontations", "past meetings"],
    ),
    (
        QuestionType::Standings,
        &["classement", "standings", "table", "ranking", "position", "rang", "leader"],
    ),
];

/// Classification floor below which the question is `Unknown`.
const MIN_CONFIDENCE: f64 = 0.15;

/// Bonus applied when the class's minimum entity requirement is met.
const ENTITY_BONUS: f64 = 0.2;

// ============================================================================
// Extraction Patterns
// ============================================================================

struct ExtractionPatterns {
    teams: Regex,
    leagues: Regex,
    players: Regex,
    /// Capitalized bigram after `joueur` / `player`
    generic_player: Regex,
    absolute_dates: Regex,
    relative_dates: Regex,
    word: Regex,
}

fn alternation(terms: impl Iterator<Item = String>) -> String {
    let mut folded: Vec<String> = terms.map(|t| strip_accents(&t).to_lowercase()).collect();
    // Longest first so multi-word aliases win over their fragments.
    folded.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    folded.dedup();
    let escaped: Vec<String> = folded.iter().map(|t| regex::escape(t)).collect();
    format!(r"\b(?:{})\b", escaped.join("|"))
}

static PATTERNS: Lazy<ExtractionPatterns> = Lazy::new(|| {
    let team_terms = team_entries()
        .iter()
        .flat_map(|t| t.aliases.iter().cloned().chain(std::iter::once(t.name.clone())));
    let league_terms = league_entries()
        .iter()
        .flat_map(|l| l.aliases.iter().cloned().chain(std::iter::once(l.name.clone())));
    let player_terms = player_entries()
        .iter()
        .flat_map(|p| p.aliases.iter().cloned().chain(std::iter::once(p.name.clone())));

    ExtractionPatterns {
        teams: Regex::new(&alternation(team_terms)).expect("team pattern"),
        leagues: Regex::new(&alternation(league_terms)).expect("league pattern"),
        players: Regex::new(&alternation(player_terms)).expect("player pattern"),
        generic_player: Regex::new(
            r"\b(?:joueur|player)\s+([A-Z][a-zà-öø-ÿ]+(?:\s+[A-Z][a-zà-öø-ÿ]+)?)",
        )
        .expect("generic player pattern"),
        absolute_dates: Regex::new(r"\b(\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4}|\d{2}-\d{2}-\d{4})\b")
            .expect("date pattern"),
        relative_dates: Regex::new(r"(?:aujourd'?\s?hui|\btoday\b|\bdemain\b|\btomorrow\b|\bhier\b|\byesterday\b)")
            .expect("relative date pattern"),
        word: Regex::new(r"[a-z0-9]+").expect("word pattern"),
    }
});

// ============================================================================
// Clarification Templates
// ============================================================================

fn clarification(slot: Slot, language: Language) -> String {
    let text = match (language, slot) {
        (Language::Fr, Slot::Teams) => "De quelle équipe parlez-vous ?",
        (Language::Fr, Slot::SecondTeam) => "Quelle est la deuxième équipe pour la comparaison ?",
        (Language::Fr, Slot::Players) => "De quel joueur parlez-vous ?",
        (Language::Fr, Slot::Dates) => "Pour quelle date ?",
        (Language::Fr, Slot::Leagues) => "Quelle ligue ou compétition vous intéresse ?",
        (Language::Fr, Slot::QuestionType) => {
            "Pouvez-vous préciser votre question ? Par exemple : le score d'un match, le classement d'une ligue, les statistiques d'un joueur..."
        }
        (Language::En, Slot::Teams) => "Which team are you asking about?",
        (Language::En, Slot::SecondTeam) => "Which is the second team for the comparison?",
        (Language::En, Slot::Players) => "Which player are you asking about?",
        (Language::En, Slot::Dates) => "For which date?",
        (Language::En, Slot::Leagues) => "Which league or competition are you interested in?",
        (Language::En, Slot::QuestionType) => {
            "Could you clarify your question? For example: a match score, league standings, player statistics..."
        }
    };
    text.to_string()
}

// ============================================================================
// Validator
// ============================================================================

/// Stateless service turning questions into validated intents.
pub struct QuestionValidator {
    metrics: Arc<PipelineMetrics>,
}

impl QuestionValidator {
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        Self { metrics }
    }

    /// Never fails: anything the validator cannot make sense of comes
    /// back as an incomplete result with a generic clarification.
    pub fn validate(&self, question: &str, context: &StructuredContext) -> ValidationResult {
        let result = self.run(question, context);
        self.metrics.record_validation(result.is_complete);
        result
    }

    fn run(&self, question: &str, context: &StructuredContext) -> ValidationResult {
        let folded = strip_accents(question).to_lowercase();

        let language = context
            .language
            .unwrap_or_else(|| detect_language(&folded));

        if folded.trim().is_empty() {
            return ValidationResult::unparseable(
                language,
                clarification(Slot::QuestionType, language),
            );
        }

        let mut entities = extract_entities(question, &folded);
        entities.detected_language = language;
        apply_context(&mut entities, context);

        let (question_type, confidence) = classify(&folded, &entities);

        let missing = missing_slots(question_type, &entities, context);
        let clarifications: Vec<String> =
            missing.iter().map(|slot| clarification(*slot, language)).collect();

        ValidationResult {
            is_complete: missing.is_empty(),
            missing_info: missing,
            clarification_questions: clarifications,
            confidence,
            question_type,
            entities,
            language,
        }
    }
}

/// Keyword-count vote between French and English; ties go to French.
fn detect_language(folded_question: &str) -> Language {
    let mut fr = 0usize;
    let mut en = 0usize;
    for word in PATTERNS.word.find_iter(folded_question) {
        let w = word.as_str();
        if FR_KEYWORDS.contains(&w) {
            fr += 1;
        }
        if EN_KEYWORDS.contains(&w) {
            en += 1;
        }
    }
    if en > fr { Language::En } else { Language::Fr }
}

fn extract_entities(question: &str, folded: &str) -> ExtractedEntities {
    let mut entities = ExtractedEntities::default();

    for m in PATTERNS.teams.find_iter(folded) {
        if let Some(team) = find_team(m.as_str())
            && !entities.teams.iter().any(|t| t.canonical == team.canonical)
        {
            entities.teams.push(EntityMention::new(team.canonical.clone(), m.as_str()));
        }
    }

    for m in PATTERNS.leagues.find_iter(folded) {
        if let Some(league) = find_league(m.as_str())
            && !entities.leagues.iter().any(|l| l.canonical == league.canonical)
        {
            entities.leagues.push(EntityMention::new(league.canonical.clone(), m.as_str()));
        }
    }

    for m in PATTERNS.players.find_iter(folded) {
        if let Some(player) = find_player(m.as_str())
            && !entities.players.iter().any(|p| p.canonical == player.canonical)
        {
            entities.players.push(EntityMention::new(player.canonical.clone(), m.as_str()));
        }
    }
    // Generic capitalized form after "joueur"/"player", on the original text.
    for capture in PATTERNS.generic_player.captures_iter(question) {
        if let Some(m) = capture.get(1) {
            let canonical = normalize_player(m.as_str());
            if !entities.players.iter().any(|p| p.canonical == canonical) {
                entities.players.push(EntityMention::new(canonical, m.as_str()));
            }
        }
    }

    for m in PATTERNS.absolute_dates.find_iter(folded) {
        if let Some(iso) = normalize_date(m.as_str())
            && !entities.dates.iter().any(|d| d.canonical == iso)
        {
            entities.dates.push(EntityMention::new(iso, m.as_str()));
        }
    }
    for m in PATTERNS.relative_dates.find_iter(folded) {
        let today = Utc::now().date_naive();
        let date = match m.as_str() {
            "demain" | "tomorrow" => today + Duration::days(1),
            "hier" | "yesterday" => today - Duration::days(1),
            _ => today,
        };
        let iso = date.format("%Y-%m-%d").to_string();
        if !entities.dates.iter().any(|d| d.canonical == iso) {
            entities.dates.push(EntityMention::new(iso, m.as_str()));
        }
    }

    entities
}

/// Caller context dominates extraction: a pinned league, team or player
/// replaces whatever the question text suggested for that kind.
fn apply_context(entities: &mut ExtractedEntities, context: &StructuredContext) {
    if let Some(team) = &context.team {
        entities.teams =
            vec![EntityMention::new(crate::utils::normalize::normalize_team(team), team.clone())];
    } else if let Some(id) = context.team_id {
        entities.teams = vec![EntityMention::new(id.to_string(), id.to_string())];
    }

    if let Some(league) = &context.league {
        entities.leagues = vec![EntityMention::new(
            crate::utils::normalize::normalize_league(league),
            league.clone(),
        )];
    } else if let Some(id) = context.league_id {
        entities.leagues = vec![EntityMention::new(id.to_string(), id.to_string())];
    }

    if let Some(player) = &context.player {
        entities.players = vec![EntityMention::new(normalize_player(player), player.clone())];
    } else if let Some(id) = context.player_id {
        entities.players = vec![EntityMention::new(id.to_string(), id.to_string())];
    }
}

fn entity_bonus(question_type: QuestionType, entities: &ExtractedEntities) -> bool {
    match question_type {
        QuestionType::MatchLiveInfo | QuestionType::MatchPrediction | QuestionType::TeamStats => {
            !entities.teams.is_empty()
        }
        QuestionType::TeamComparison | QuestionType::HeadToHead => entities.teams.len() >= 2,
        QuestionType::PlayerInfo => !entities.players.is_empty(),
        QuestionType::LeagueInfo | QuestionType::Standings => !entities.leagues.is_empty(),
        QuestionType::Unknown => false,
    }
}

/// Scores every class as matched-keywords / 3 (clamped), plus a bonus
/// when the minimum entity is present; below the floor means `Unknown`.
fn classify(folded: &str, entities: &ExtractedEntities) -> (QuestionType, f64) {
    let mut best = (QuestionType::Unknown, 0.0f64);
    for (question_type, keywords) in CLASS_KEYWORDS {
        let matched = keywords.iter().filter(|k| folded.contains(*k)).count();
        let mut score = (matched as f64 / 3.0).min(1.0);
        if matched > 0 && entity_bonus(*question_type, entities) {
            score = (score + ENTITY_BONUS).min(1.0);
        }
        if score > best.1 {
            best = (*question_type, score);
        }
    }
    if best.1 < MIN_CONFIDENCE {
        (QuestionType::Unknown, best.1)
    } else {
        best
    }
}

fn missing_slots(
    question_type: QuestionType,
    entities: &ExtractedEntities,
    context: &StructuredContext,
) -> Vec<Slot> {
    // A pinned fixture already names both sides for match-centric
    // intents; it cannot stand in for a team anywhere else.
    let fixture_fills_teams = context.has_fixture()
        && matches!(
            question_type,
            QuestionType::MatchLiveInfo | QuestionType::MatchPrediction
        );

    let mut missing = Vec::new();
    for slot in question_type.required_slots() {
        let filled = match slot {
            Slot::Teams => !entities.teams.is_empty() || fixture_fills_teams,
            Slot::SecondTeam => entities.teams.len() >= 2 || fixture_fills_teams,
            Slot::Players => !entities.players.is_empty(),
            Slot::Leagues => !entities.leagues.is_empty(),
            Slot::Dates => !entities.dates.is_empty(),
            Slot::QuestionType => question_type != QuestionType::Unknown,
        };
        if !filled {
            missing.push(*slot);
        }
    }
    // Reporting "no second team" is meaningless while no team at all is known.
    if missing.contains(&Slot::Teams) {
        missing.retain(|s| *s != Slot::SecondTeam);
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> QuestionValidator {
        QuestionValidator::new(Arc::new(PipelineMetrics::new().unwrap()))
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(detect_language("quel est le score du match"), Language::Fr);
        assert_eq!(detect_language("what is the score of the match"), Language::En);
        // Tie defaults to French
        assert_eq!(detect_language("psg lyon"), Language::Fr);
    }

    #[test]
    fn test_score_question_is_complete() {
        let result = validator().validate(
            "Quel est le score de PSG contre Lyon ?",
            &StructuredContext::default(),
        );

        assert!(result.is_complete);
        assert_eq!(result.question_type, QuestionType::MatchLiveInfo);
        assert_eq!(result.language, Language::Fr);
        let teams: Vec<&str> = result.entities.teams.iter().map(|t| t.canonical.as_str()).collect();
        assert_eq!(teams, vec!["paris_saint_germain", "olympique_lyonnais"]);
    }

    #[test]
    fn test_standings_without_league_asks_for_one() {
        let result = validator().validate("Quel est le classement ?", &StructuredContext::default());

        assert!(!result.is_complete);
        assert_eq!(result.question_type, QuestionType::Standings);
        assert_eq!(result.missing_info, vec![Slot::Leagues]);
        assert_eq!(
            result.clarification_questions,
            vec!["Quelle ligue ou compétition vous intéresse ?".to_string()]
        );
    }

    #[test]
    fn test_context_league_overrides_text() {
        let context = StructuredContext { league: Some("Ligue 1".to_string()), ..Default::default() };
        let result =
            validator().validate("Quel est le classement de la Premier League ?", &context);

        assert!(result.is_complete);
        assert_eq!(result.entities.leagues.len(), 1);
        assert_eq!(result.entities.leagues[0].canonical, "ligue_1");
        assert_eq!(result.entities.leagues[0].mentioned, "Ligue 1");
    }

    #[test]
    fn test_h2h_requires_two_teams() {
        let one = validator().validate("Historique des confrontations du PSG", &StructuredContext::default());
        assert!(!one.is_complete);
        assert_eq!(one.question_type, QuestionType::HeadToHead);
        assert_eq!(one.missing_info, vec![Slot::SecondTeam]);

        let two = validator().validate("Historique PSG Lyon", &StructuredContext::default());
        assert!(two.is_complete);
        assert_eq!(two.question_type, QuestionType::HeadToHead);
    }

    #[test]
    fn test_player_dictionary_and_generic_pattern() {
        let known = validator().validate(
            "Combien de buts de Mbappé cette saison ?",
            &StructuredContext::default(),
        );
        assert!(known.entities.players.iter().any(|p| p.canonical == "kylian_mbappe"));

        let generic = validator().validate(
            "Statistiques du joueur Rayan Cherki",
            &StructuredContext::default(),
        );
        assert!(generic.entities.players.iter().any(|p| p.canonical == "rayan_cherki"));
    }

    #[test]
    fn test_accented_and_alias_team_spellings() {
        let result = validator().validate(
            "Atlético Madrid contre le Barça, quel score ?",
            &StructuredContext::default(),
        );
        let teams: Vec<&str> = result.entities.teams.iter().map(|t| t.canonical.as_str()).collect();
        assert_eq!(teams, vec!["atletico_madrid", "fc_barcelona"]);
    }

    #[test]
    fn test_date_extraction() {
        let result = validator().validate(
            "Matchs du PSG le 01/08/2026",
            &StructuredContext::default(),
        );
        assert_eq!(result.entities.dates.len(), 1);
        assert_eq!(result.entities.dates[0].canonical, "2026-08-01");

        let relative = validator().validate("Qui joue aujourd'hui en Ligue 1 ?", &StructuredContext::default());
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        assert!(relative.entities.dates.iter().any(|d| d.canonical == today));
    }

    #[test]
    fn test_gibberish_is_unknown_with_clarification() {
        let result = validator().validate("xyzzy plugh", &StructuredContext::default());
        assert!(!result.is_complete);
        assert_eq!(result.question_type, QuestionType::Unknown);
        assert_eq!(result.missing_info, vec![Slot::QuestionType]);
        assert_eq!(result.clarification_questions.len(), 1);
    }

    #[test]
    fn test_english_clarification_localized() {
        let result = validator().validate("What are the standings?", &StructuredContext::default());
        assert!(!result.is_complete);
        assert_eq!(result.language, Language::En);
        assert_eq!(
            result.clarification_questions,
            vec!["Which league or competition are you interested in?".to_string()]
        );
    }

    #[test]
    fn test_full_match_analysis_classification() {
        let result = validator().validate(
            "Analyse complète du match PSG vs OM",
            &StructuredContext::default(),
        );
        assert!(result.is_complete);
        assert_eq!(result.question_type, QuestionType::MatchLiveInfo);
        assert_eq!(result.entities.teams.len(), 2);
    }

    #[test]
    fn test_empty_question_unparseable() {
        let result = validator().validate("   ", &StructuredContext::default());
        assert!(!result.is_complete);
        assert_eq!(result.question_type, QuestionType::Unknown);
    }
}
