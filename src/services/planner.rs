//! Endpoint Planner
//!
//! Builds the minimal execution plan for a validated question: gathers
//! candidate endpoints from the knowledge base, drops what the cache
//! already holds, collapses subsets covered by an enriched endpoint,
//! injects resolver calls for missing parameters and orders everything
//! into a dependency DAG.

use crate::metrics::PipelineMetrics;
use crate::models::{
    EndpointCall, EndpointDescriptor, ExecutionPlan, ExtractedEntities, ParamValue, PlanningError,
    PresatisfiedEntry, QuestionType, StructuredContext, ValidationResult,
};
use crate::services::cache::ApiCache;
use crate::services::knowledge_base::KnowledgeBase;
use crate::utils::normalize::{find_league, find_team};
use chrono::{Datelike, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A parameter slot that may still need a resolver call.
#[derive(Debug, Clone)]
enum Need {
    Ready(ParamValue),
    /// Id of the n-th mentioned team
    TeamId(usize),
    /// Id of the n-th mentioned player
    PlayerId(usize),
    /// Id of the fixture the question is about
    FixtureId,
    /// `{id_a}-{id_b}` pair of the first two teams
    H2hPair,
}

/// A tentatively selected endpoint before resolver injection.
#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    params: BTreeMap<String, Need>,
}

impl Candidate {
    fn new(descriptor: &EndpointDescriptor) -> Self {
        Self { name: descriptor.name.clone(), params: BTreeMap::new() }
    }

    fn with(mut self, name: &str, need: Need) -> Self {
        self.params.insert(name.to_string(), need);
        self
    }

    /// Literal parameter map when nothing needs resolving.
    fn literal_params(&self) -> Option<BTreeMap<String, Value>> {
        let mut out = BTreeMap::new();
        for (name, need) in &self.params {
            match need {
                Need::Ready(ParamValue::Literal(value)) => {
                    out.insert(name.clone(), value.clone());
                }
                _ => return None,
            }
        }
        Some(out)
    }
}

/// Per-invocation planning inputs derived once.
struct PlanInputs<'a> {
    entities: &'a ExtractedEntities,
    context: &'a StructuredContext,
    season: i64,
    date: String,
}

impl PlanInputs<'_> {
    /// Already-known numeric id for the n-th team, if any (caller
    /// context pins ids as numeric canonicals).
    fn team_literal(&self, index: usize) -> Option<i64> {
        self.entities.teams.get(index)?.canonical.parse().ok()
    }

    fn player_literal(&self, index: usize) -> Option<i64> {
        self.entities.players.get(index)?.canonical.parse().ok()
    }

    /// League identifier: pinned id, alias-table id, or the raw
    /// canonical as a last resort.
    fn league_value(&self) -> Option<Value> {
        if let Some(id) = self.context.league_id {
            return Some(Value::from(id));
        }
        let league = self.entities.leagues.first()?;
        if let Ok(id) = league.canonical.parse::<i64>() {
            return Some(Value::from(id));
        }
        match find_league(&league.canonical) {
            Some(entry) => Some(Value::from(entry.api_id)),
            None => Some(Value::from(league.canonical.clone())),
        }
    }

    /// Search string for a team resolver: the dictionary display name
    /// when the club is known (stable across sessions), otherwise the
    /// text as mentioned.
    fn team_search_text(&self, index: usize) -> Option<String> {
        let team = self.entities.teams.get(index)?;
        Some(match find_team(&team.canonical) {
            Some(entry) => entry.name.clone(),
            None => team.mentioned.clone(),
        })
    }

    fn player_search_text(&self, index: usize) -> Option<String> {
        let player = self.entities.players.get(index)?;
        Some(player.mentioned.clone())
    }
}

/// Season label for a date: July onward belongs to the season starting
/// that year (API-Football convention).
fn current_season() -> i64 {
    let today = Utc::now().date_naive();
    if today.month() >= 7 { i64::from(today.year()) } else { i64::from(today.year()) - 1 }
}

// ============================================================================
// Planner
// ============================================================================

pub struct EndpointPlanner {
    knowledge_base: Arc<KnowledgeBase>,
    cache: Arc<ApiCache>,
    metrics: Arc<PipelineMetrics>,
}

impl EndpointPlanner {
    pub fn new(
        knowledge_base: Arc<KnowledgeBase>,
        cache: Arc<ApiCache>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self { knowledge_base, cache, metrics }
    }

    /// Produces a dependency-ordered plan for a validated question.
    pub async fn plan(
        &self,
        validation: &ValidationResult,
        context: &StructuredContext,
    ) -> Result<ExecutionPlan, PlanningError> {
        let inputs = PlanInputs {
            entities: &validation.entities,
            context,
            season: i64::from(context.season.unwrap_or(current_season() as i32)),
            date: validation
                .entities
                .dates
                .first()
                .map(|d| d.canonical.clone())
                .unwrap_or_else(|| Utc::now().date_naive().format("%Y-%m-%d").to_string()),
        };

        let mut candidates = self.gather_candidates(validation.question_type, &inputs)?;
        let presatisfied = self.prune_cached(&mut candidates).await;
        self.substitute_enriched(&mut candidates)?;

        let plan = self.resolve_dependencies(candidates, presatisfied, &inputs)?;

        // A cycle here is a catalog bug, not an upstream problem.
        let levels = plan.levels()?;
        tracing::debug!(
            calls = plan.total_calls(),
            levels = levels.len(),
            presatisfied = plan.presatisfied.len(),
            "plan built"
        );
        self.metrics.plans_generated_total.inc();
        self.metrics.planned_calls_total.inc_by(plan.total_calls() as u64);
        Ok(plan)
    }

    /// First catalog hit for a use-case query.
    fn use_case(&self, query: &str) -> Result<&EndpointDescriptor, PlanningError> {
        self.knowledge_base
            .search_by_use_case(query)
            .into_iter()
            .next()
            .ok_or_else(|| PlanningError::UnknownEndpoint(format!("no endpoint for: {query}")))
    }

    /// Step 1: candidates per question intent. Each entry names what the
    /// answer needs; parameters that cannot be filled from entities or
    /// context stay symbolic until resolver injection.
    fn gather_candidates(
        &self,
        question_type: QuestionType,
        inputs: &PlanInputs<'_>,
    ) -> Result<Vec<Candidate>, PlanningError> {
        let season = Need::Ready(ParamValue::literal(inputs.season));
        let mut candidates = Vec::new();

        match question_type {
            QuestionType::MatchLiveInfo => {
                for query in
                    ["match events", "match lineups", "match statistics", "player match ratings"]
                {
                    let descriptor = self.use_case(query)?;
                    candidates
                        .push(Candidate::new(descriptor).with("fixture", Need::FixtureId));
                }
            }
            QuestionType::MatchPrediction => {
                candidates.push(
                    Candidate::new(self.use_case("match prediction")?)
                        .with("fixture", Need::FixtureId),
                );
                if inputs.entities.teams.len() >= 2 {
                    candidates.push(
                        Candidate::new(self.use_case("head to head history")?)
                            .with("h2h", Need::H2hPair),
                    );
                }
                if !inputs.entities.teams.is_empty() {
                    candidates.push(
                        Candidate::new(self.use_case("recent form")?)
                            .with("team", Need::TeamId(0))
                            .with("last", Need::Ready(ParamValue::literal(5))),
                    );
                }
            }
            QuestionType::TeamComparison => {
                for index in 0..inputs.entities.teams.len().min(2) {
                    candidates.push(self.team_form_candidate(inputs, index, 5, &season)?);
                }
                candidates.push(
                    Candidate::new(self.use_case("head to head history")?)
                        .with("h2h", Need::H2hPair),
                );
            }
            QuestionType::TeamStats => {
                candidates.push(self.team_form_candidate(inputs, 0, 10, &season)?);
            }
            QuestionType::PlayerInfo => {
                candidates.push(
                    Candidate::new(self.use_case("player statistics")?)
                        .with("id", Need::PlayerId(0))
                        .with("season", season.clone()),
                );
            }
            QuestionType::LeagueInfo => {
                let descriptor = self.use_case("league information")?;
                let candidate = match inputs.league_value() {
                    Some(Value::Number(id)) => Candidate::new(descriptor)
                        .with("id", Need::Ready(ParamValue::Literal(Value::Number(id)))),
                    Some(other) => Candidate::new(descriptor)
                        .with("search", Need::Ready(ParamValue::Literal(other))),
                    None => Candidate::new(descriptor),
                };
                candidates.push(candidate);
            }
            QuestionType::HeadToHead => {
                candidates.push(
                    Candidate::new(self.use_case("head to head history")?)
                        .with("h2h", Need::H2hPair),
                );
            }
            QuestionType::Standings => {
                let league = inputs.league_value().unwrap_or(Value::Null);
                candidates.push(
                    Candidate::new(self.use_case("league standings")?)
                        .with("league", Need::Ready(ParamValue::Literal(league)))
                        .with("season", season.clone()),
                );
            }
            QuestionType::Unknown => {}
        }

        Ok(candidates)
    }

    /// Season-long statistics when the league is known, recent form
    /// otherwise (team statistics cannot be queried without a league).
    fn team_form_candidate(
        &self,
        inputs: &PlanInputs<'_>,
        team_index: usize,
        last: i64,
        season: &Need,
    ) -> Result<Candidate, PlanningError> {
        match inputs.league_value() {
            Some(league) => Ok(Candidate::new(self.use_case("team statistics")?)
                .with("league", Need::Ready(ParamValue::Literal(league)))
                .with("season", season.clone())
                .with("team", Need::TeamId(team_index))),
            None => Ok(Candidate::new(self.use_case("recent form")?)
                .with("team", Need::TeamId(team_index))
                .with("last", Need::Ready(ParamValue::literal(last)))),
        }
    }

    /// Step 2: candidates whose parameters are fully literal and whose
    /// data is already cached become pre-satisfied entries instead of
    /// calls. Placeholder-bearing candidates cannot be keyed yet and
    /// always stay in the plan.
    async fn prune_cached(&self, candidates: &mut Vec<Candidate>) -> Vec<PresatisfiedEntry> {
        let mut presatisfied = Vec::new();
        let mut remaining = Vec::with_capacity(candidates.len());
        for candidate in candidates.drain(..) {
            if let Some(params) = candidate.literal_params() {
                if let Some(data) = self.cache.get(&candidate.name, &params).await {
                    tracing::debug!(endpoint = %candidate.name, "candidate pre-satisfied from cache");
                    presatisfied.push(PresatisfiedEntry {
                        endpoint_name: candidate.name,
                        params,
                        data,
                    });
                    continue;
                }
            }
            remaining.push(candidate);
        }
        *candidates = remaining;
        presatisfied
    }

    /// Step 3: redundancy elimination. Any candidate fully covered by an
    /// already-chosen enriched candidate is dropped; then every subset
    /// of two or more candidates coverable by one enriched endpoint is
    /// replaced by that single composite call. Ties between composites
    /// go to the one covering more, then to the cheaper one, then to
    /// catalog order.
    fn substitute_enriched(&self, candidates: &mut Vec<Candidate>) -> Result<(), PlanningError> {
        // Covered-by-chosen pass.
        let chosen_enriched: Vec<String> = candidates
            .iter()
            .filter(|c| self.knowledge_base.get(&c.name).is_some_and(|d| d.is_enriched))
            .map(|c| c.name.clone())
            .collect();
        for enriched_name in &chosen_enriched {
            let Some(enriched) = self.knowledge_base.get(enriched_name) else { continue };
            candidates.retain(|c| {
                if c.name == *enriched_name {
                    return true;
                }
                match self.knowledge_base.get(&c.name) {
                    Some(d) => !enriched.covers_sections(&d.returned_sections),
                    None => true,
                }
            });
        }

        // Collapse pass.
        loop {
            let mut best: Option<(&EndpointDescriptor, Vec<usize>)> = None;
            for enriched in self.knowledge_base.enriched() {
                if candidates.iter().any(|c| c.name == enriched.name) {
                    continue;
                }
                let covered: Vec<usize> = candidates
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| {
                        self.knowledge_base
                            .get(&c.name)
                            .is_some_and(|d| enriched.covers_sections(&d.returned_sections))
                    })
                    .map(|(i, _)| i)
                    .collect();
                if covered.len() < 2 {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((current, current_covered)) => {
                        covered.len() > current_covered.len()
                            || (covered.len() == current_covered.len()
                                && enriched.api_cost < current.api_cost)
                    }
                };
                if better {
                    best = Some((enriched, covered));
                }
            }

            let Some((enriched, covered)) = best else { break };
            tracing::debug!(
                composite = %enriched.name,
                replaced = covered.len(),
                "collapsing candidates into enriched endpoint"
            );
            for index in covered.into_iter().rev() {
                candidates.remove(index);
            }
            let mut composite = Candidate { name: enriched.name.clone(), params: BTreeMap::new() };
            for param in &enriched.required_params {
                let need = match param.as_str() {
                    "id" | "fixture" => Need::FixtureId,
                    "h2h" => Need::H2hPair,
                    "team" => Need::TeamId(0),
                    other => {
                        return Err(PlanningError::UnknownEndpoint(format!(
                            "{}: unmapped composite parameter {other}",
                            enriched.name
                        )));
                    }
                };
                composite.params.insert(param.clone(), need);
            }
            candidates.push(composite);
        }
        Ok(())
    }

    /// Steps 4 and 5: inject resolver calls for symbolic needs and emit
    /// calls with `call_N` ids in topological order. Level grouping is
    /// derived from the dependency sets by `ExecutionPlan::levels`.
    fn resolve_dependencies(
        &self,
        candidates: Vec<Candidate>,
        presatisfied: Vec<PresatisfiedEntry>,
        inputs: &PlanInputs<'_>,
    ) -> Result<ExecutionPlan, PlanningError> {
        // A head-to-head fixture resolver would reintroduce data a
        // planned composite already covers; use the single-team search
        // in that case.
        let h2h_section: std::collections::BTreeSet<String> =
            std::iter::once("h2h".to_string()).collect();
        let avoid_h2h_resolver = candidates.iter().any(|c| {
            self.knowledge_base
                .get(&c.name)
                .is_some_and(|d| d.covers_sections(&h2h_section))
        });

        let mut builder = CallBuilder {
            planner: self,
            inputs,
            calls: Vec::new(),
            team_calls: BTreeMap::new(),
            player_calls: BTreeMap::new(),
            fixture_call: None,
            avoid_h2h_resolver,
        };

        // Resolver calls take ids before the candidate that needs them,
        // keeping call ids topologically ordered.
        for candidate in candidates {
            let mut resolved = Vec::with_capacity(candidate.params.len());
            for (name, need) in candidate.params {
                resolved.push((name, builder.resolve(need)?));
            }
            let mut call = EndpointCall::new(builder.next_id(), candidate.name);
            for (name, value) in resolved {
                call = call.with_param(name, value);
            }
            builder.calls.push(call);
        }

        Ok(ExecutionPlan { calls: builder.calls, presatisfied })
    }
}

/// Mutable state while turning candidates into ordered calls.
struct CallBuilder<'a> {
    planner: &'a EndpointPlanner,
    inputs: &'a PlanInputs<'a>,
    calls: Vec<EndpointCall>,
    team_calls: BTreeMap<usize, String>,
    player_calls: BTreeMap<usize, String>,
    fixture_call: Option<String>,
    avoid_h2h_resolver: bool,
}

impl CallBuilder<'_> {
    fn next_id(&self) -> String {
        format!("call_{}", self.calls.len())
    }

    fn resolve(&mut self, need: Need) -> Result<ParamValue, PlanningError> {
        match need {
            Need::Ready(value) => Ok(value),
            Need::TeamId(index) => self.team_id(index),
            Need::PlayerId(index) => self.player_id(index),
            Need::FixtureId => self.fixture_id(),
            Need::H2hPair => self.h2h_pair(),
        }
    }

    fn team_id(&mut self, index: usize) -> Result<ParamValue, PlanningError> {
        if let Some(id) = self.inputs.team_literal(index) {
            return Ok(ParamValue::literal(id));
        }
        if let Some(call_id) = self.team_calls.get(&index) {
            return Ok(ParamValue::reference(call_id.clone()));
        }
        let search = self.inputs.team_search_text(index).ok_or_else(|| {
            PlanningError::MissingEntity(format!("no team entity at position {index}"))
        })?;
        let descriptor = self.planner.use_case("resolve team id")?;
        let call_id = self.next_id();
        let call = EndpointCall::new(call_id.clone(), descriptor.name.clone())
            .with_param("search", ParamValue::literal(search));
        self.calls.push(call);
        self.team_calls.insert(index, call_id.clone());
        Ok(ParamValue::reference(call_id))
    }

    fn player_id(&mut self, index: usize) -> Result<ParamValue, PlanningError> {
        if let Some(id) = self.inputs.player_literal(index) {
            return Ok(ParamValue::literal(id));
        }
        if let Some(call_id) = self.player_calls.get(&index) {
            return Ok(ParamValue::reference(call_id.clone()));
        }
        let search = self.inputs.player_search_text(index).ok_or_else(|| {
            PlanningError::MissingEntity(format!("no player entity at position {index}"))
        })?;
        let descriptor = self.planner.use_case("resolve player id")?;
        let call_id = self.next_id();
        let call = EndpointCall::new(call_id.clone(), descriptor.name.clone())
            .with_param("search", ParamValue::literal(search));
        self.calls.push(call);
        self.player_calls.insert(index, call_id.clone());
        Ok(ParamValue::reference(call_id))
    }

    /// Combined `{a}-{b}` pair, as literal ids or a placeholder string.
    fn h2h_pair(&mut self) -> Result<ParamValue, PlanningError> {
        let sides: Result<Vec<String>, PlanningError> = (0..2)
            .map(|index| {
                Ok(match self.team_id(index)? {
                    ParamValue::Literal(value) => match value {
                        Value::Number(n) => n.to_string(),
                        Value::String(s) => s,
                        other => other.to_string(),
                    },
                    ParamValue::Reference(source) => format!("<from_{source}>"),
                })
            })
            .collect();
        Ok(ParamValue::literal(sides?.join("-")))
    }

    /// The fixture the question is about: pinned id, or a search by the
    /// two teams on the question's date, or by the single known team.
    fn fixture_id(&mut self) -> Result<ParamValue, PlanningError> {
        if let Some(id) = self.inputs.context.fixture_id {
            return Ok(ParamValue::literal(id));
        }
        if let Some(call_id) = &self.fixture_call {
            return Ok(ParamValue::reference(call_id.clone()));
        }

        let call = if self.inputs.entities.teams.len() >= 2 && !self.avoid_h2h_resolver {
            let pair = self.h2h_pair()?;
            let descriptor = self.planner.use_case("head to head history")?;
            EndpointCall::new(self.next_id(), descriptor.name.clone())
                .with_param("h2h", pair)
                .with_param("date", ParamValue::literal(self.inputs.date.clone()))
        } else {
            let team = self.team_id(0)?;
            let descriptor = self.planner.use_case("resolve fixture id")?;
            EndpointCall::new(self.next_id(), descriptor.name.clone())
                .with_param("team", team)
                .with_param("date", ParamValue::literal(self.inputs.date.clone()))
        };
        let call_id = call.call_id.clone();
        self.calls.push(call);
        self.fixture_call = Some(call_id.clone());
        Ok(ParamValue::reference(call_id))
    }
}
