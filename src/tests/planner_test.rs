// Planner behavior: plan shapes, resolver injection, redundancy
// elimination and cache-aware pruning.

use super::common::{MockFootballApi, build_pipeline};
use crate::metrics::PipelineMetrics;
use crate::models::{ParamValue, StructuredContext, ValidationResult};
use crate::services::cache::{ApiCache, MemoryStore};
use crate::services::knowledge_base::KnowledgeBase;
use crate::services::planner::EndpointPlanner;
use crate::services::validator::QuestionValidator;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

struct PlannerFixture {
    validator: QuestionValidator,
    planner: EndpointPlanner,
    cache: Arc<ApiCache>,
}

fn fixture() -> PlannerFixture {
    let metrics = Arc::new(PipelineMetrics::new().unwrap());
    let knowledge_base = Arc::new(KnowledgeBase::new());
    let cache = Arc::new(ApiCache::new(
        Arc::new(MemoryStore::new()),
        Arc::clone(&knowledge_base),
        Arc::clone(&metrics),
    ));
    PlannerFixture {
        validator: QuestionValidator::new(Arc::clone(&metrics)),
        planner: EndpointPlanner::new(knowledge_base, Arc::clone(&cache), metrics),
        cache,
    }
}

fn validated(fixture: &PlannerFixture, question: &str, context: &StructuredContext) -> ValidationResult {
    let validation = fixture.validator.validate(question, context);
    assert!(validation.is_complete, "question unexpectedly incomplete: {question}");
    validation
}

fn endpoint_names(plan: &crate::models::ExecutionPlan) -> Vec<&str> {
    plan.calls.iter().map(|c| c.endpoint_name.as_str()).collect()
}

#[tokio::test]
async fn test_score_question_plan_shape() {
    let fixture = fixture();
    let context = StructuredContext::default();
    let validation = validated(&fixture, "Quel est le score de PSG contre Lyon ?", &context);

    let plan = fixture.planner.plan(&validation, &context).await.unwrap();

    assert_eq!(
        endpoint_names(&plan),
        vec!["team_search", "team_search", "head_to_head", "fixture_details"]
    );
    let ids: Vec<&str> = plan.calls.iter().map(|c| c.call_id.as_str()).collect();
    assert_eq!(ids, vec!["call_0", "call_1", "call_2", "call_3"]);

    // Two searches run together, then the fixture lookup, then the
    // composite call.
    let levels = plan.levels().unwrap();
    let level_ids: Vec<Vec<&str>> = levels
        .iter()
        .map(|level| level.iter().map(|c| c.call_id.as_str()).collect())
        .collect();
    assert_eq!(level_ids, vec![vec!["call_0", "call_1"], vec!["call_2"], vec!["call_3"]]);

    let h2h = &plan.calls[2];
    assert_eq!(
        h2h.params.get("h2h"),
        Some(&ParamValue::literal("<from_call_0>-<from_call_1>"))
    );
    assert!(h2h.params.contains_key("date"));

    let details = &plan.calls[3];
    assert_eq!(details.params.get("id"), Some(&ParamValue::reference("call_2")));
}

#[tokio::test]
async fn test_fixture_sections_collapse_into_composite() {
    let fixture = fixture();
    let context = StructuredContext::default();
    let validation = validated(&fixture, "Analyse complète du match PSG vs OM", &context);

    let plan = fixture.planner.plan(&validation, &context).await.unwrap();
    let names = endpoint_names(&plan);

    assert_eq!(names.iter().filter(|n| **n == "fixture_details").count(), 1);
    for narrow in ["fixture_events", "fixture_lineups", "fixture_statistics", "fixture_players"] {
        assert!(!names.contains(&narrow), "{narrow} should be covered by the composite");
    }
}

#[tokio::test]
async fn test_pinned_fixture_needs_single_call() {
    let fixture = fixture();
    let context = StructuredContext { fixture_id: Some(5555), ..Default::default() };
    let validation = validated(&fixture, "Analyse complète du match PSG vs OM", &context);

    let plan = fixture.planner.plan(&validation, &context).await.unwrap();

    assert_eq!(endpoint_names(&plan), vec!["fixture_details"]);
    assert_eq!(plan.calls[0].params.get("id"), Some(&ParamValue::literal(5555)));
    assert!(plan.calls[0].depends_on.is_empty());
}

#[tokio::test]
async fn test_prediction_plan_keeps_only_the_composite() {
    let fixture = fixture();
    let context = StructuredContext::default();
    let validation = validated(&fixture, "Qui va gagner entre PSG et Lyon ?", &context);
    assert_eq!(validation.question_type, crate::models::QuestionType::MatchPrediction);

    let plan = fixture.planner.plan(&validation, &context).await.unwrap();
    let names = endpoint_names(&plan);

    assert!(names.contains(&"predictions"));
    // The prediction composite subsumes recent form and H2H history; a
    // head-to-head call must not reappear, not even as the fixture
    // resolver.
    assert!(!names.contains(&"head_to_head"));
    assert!(!names.contains(&"team_recent_form"));
    assert!(names.contains(&"fixtures_by_team"));
}

#[tokio::test]
async fn test_standings_plan_carries_pinned_league() {
    let fixture = fixture();
    let context = StructuredContext {
        league: Some("Ligue 1".to_string()),
        season: Some(2026),
        ..Default::default()
    };
    let validation =
        validated(&fixture, "Quel est le classement de la Premier League ?", &context);

    let plan = fixture.planner.plan(&validation, &context).await.unwrap();

    assert_eq!(endpoint_names(&plan), vec!["standings"]);
    let standings = &plan.calls[0];
    assert_eq!(standings.params.get("league"), Some(&ParamValue::literal(61)));
    assert_eq!(standings.params.get("season"), Some(&ParamValue::literal(2026)));
}

#[tokio::test]
async fn test_player_plan_resolves_id_first() {
    let fixture = fixture();
    let context = StructuredContext { season: Some(2026), ..Default::default() };
    let validation = validated(&fixture, "Statistiques du joueur Mbappé ?", &context);

    let plan = fixture.planner.plan(&validation, &context).await.unwrap();

    assert_eq!(endpoint_names(&plan), vec!["player_search", "player_statistics"]);
    assert_eq!(
        plan.calls[1].params.get("id"),
        Some(&ParamValue::reference("call_0"))
    );
    assert_eq!(plan.levels().unwrap().len(), 2);
}

#[tokio::test]
async fn test_cached_candidate_is_presatisfied() {
    let fixture = fixture();
    let context = StructuredContext {
        league: Some("Ligue 1".to_string()),
        season: Some(2026),
        ..Default::default()
    };
    let validation = validated(&fixture, "Quel est le classement ?", &context);

    // Warm the cache with exactly what the standings candidate asks for.
    let mut params = BTreeMap::new();
    params.insert("league".to_string(), json!(61));
    params.insert("season".to_string(), json!(2026));
    fixture
        .cache
        .set("standings", &params, json!({"response": ["table"]}), None)
        .await;

    let plan = fixture.planner.plan(&validation, &context).await.unwrap();

    assert!(plan.calls.is_empty());
    assert_eq!(plan.presatisfied.len(), 1);
    assert_eq!(plan.presatisfied[0].endpoint_name, "standings");
    assert_eq!(plan.presatisfied[0].data, json!({"response": ["table"]}));
}

#[tokio::test]
async fn test_h2h_plan_shape() {
    let fixture = fixture();
    let context = StructuredContext::default();
    let validation = validated(&fixture, "Historique PSG Lyon", &context);

    let plan = fixture.planner.plan(&validation, &context).await.unwrap();

    assert_eq!(endpoint_names(&plan), vec!["team_search", "team_search", "head_to_head"]);
    let levels = plan.levels().unwrap();
    assert_eq!(levels.len(), 2);
    assert_eq!(levels[0].len(), 2);
}

#[tokio::test]
async fn test_pipeline_surfaces_planning_shape_in_bundle() {
    let api = MockFootballApi::new();
    let pipeline = build_pipeline(api);

    let response = pipeline
        .process("Quel est le score de PSG contre Lyon ?", None)
        .await;
    let bundle = response.as_bundle().expect("expected a bundle");

    // The plan is kept in the bundle for introspection even when
    // execution fails (no canned responses here).
    assert_eq!(bundle.plan.total_calls(), 4);
    assert!(!bundle.execution.success);
}
