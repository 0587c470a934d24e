// Common test utilities and helpers

use crate::config::Config;
use crate::metrics::PipelineMetrics;
use crate::services::cache::{ApiCache, MemoryStore};
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::football_client::{ApiError, FootballApi};
use crate::services::knowledge_base::KnowledgeBase;
use crate::services::orchestrator::{ApiOrchestrator, OrchestratorConfig};
use crate::services::pipeline::AutonomousPipeline;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One canned-response rule: endpoint, optional parameter condition
/// (value string contains), response to return.
struct MockRule {
    endpoint: String,
    condition: Option<(String, String)>,
    response: Value,
}

/// Scriptable upstream double: canned responses per endpoint (optionally
/// gated on a parameter substring), failure injection, call accounting.
/// Parameters still carrying an unresolved `<from_...>` placeholder are
/// rejected, as the real upstream would.
#[derive(Default)]
pub struct MockFootballApi {
    rules: Mutex<Vec<MockRule>>,
    fail_remaining: DashMap<String, u32>,
    fail_all: AtomicBool,
    call_counts: DashMap<String, u32>,
    call_log: Mutex<Vec<(String, BTreeMap<String, Value>)>>,
    delay: Mutex<Option<Duration>>,
}

impl MockFootballApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, endpoint: &str, response: Value) {
        self.rules.lock().unwrap().push(MockRule {
            endpoint: endpoint.to_string(),
            condition: None,
            response,
        });
    }

    /// Responds only when `params[param]`'s string form contains `needle`.
    pub fn respond_when(&self, endpoint: &str, param: &str, needle: &str, response: Value) {
        self.rules.lock().unwrap().push(MockRule {
            endpoint: endpoint.to_string(),
            condition: Some((param.to_string(), needle.to_string())),
            response,
        });
    }

    /// Next `times` calls to `endpoint` fail with a transport error.
    pub fn fail_times(&self, endpoint: &str, times: u32) {
        self.fail_remaining.insert(endpoint.to_string(), times);
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls_to(&self, endpoint: &str) -> u32 {
        self.call_counts.get(endpoint).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.call_counts.iter().map(|e| *e.value()).sum()
    }

    pub fn last_params(&self, endpoint: &str) -> Option<BTreeMap<String, Value>> {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(name, _)| name == endpoint)
            .map(|(_, params)| params.clone())
    }

    fn param_text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
impl FootballApi for MockFootballApi {
    async fn call(
        &self,
        endpoint_name: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<Value, ApiError> {
        *self.call_counts.entry(endpoint_name.to_string()).or_insert(0) += 1;
        self.call_log
            .lock()
            .unwrap()
            .push((endpoint_name.to_string(), params.clone()));

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("injected failure".to_string()));
        }
        if let Some(mut remaining) = self.fail_remaining.get_mut(endpoint_name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ApiError::Transport("injected failure".to_string()));
        }
        for value in params.values() {
            if Self::param_text(value).contains("<from_") {
                return Err(ApiError::Status {
                    code: 400,
                    body: "unresolved parameter".to_string(),
                });
            }
        }

        let rules = self.rules.lock().unwrap();
        for rule in rules.iter() {
            if rule.endpoint != endpoint_name {
                continue;
            }
            match &rule.condition {
                None => return Ok(rule.response.clone()),
                Some((param, needle)) => {
                    if params
                        .get(param)
                        .is_some_and(|v| Self::param_text(v).contains(needle))
                    {
                        return Ok(rule.response.clone());
                    }
                }
            }
        }
        Err(ApiError::Status { code: 404, body: format!("no canned response for {endpoint_name}") })
    }
}

// ============================================================================
// Wiring Helpers
// ============================================================================

/// Fast-failing config for tests: sub-second retry delays.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.retry_delay_ms = 10;
    config
}

pub fn build_pipeline(api: Arc<MockFootballApi>) -> AutonomousPipeline {
    AutonomousPipeline::new(api, Arc::new(MemoryStore::new()), &test_config())
        .expect("pipeline wiring")
}

/// Bare orchestrator over a fresh cache and breaker, for plan-level tests.
pub struct OrchestratorFixture {
    pub orchestrator: ApiOrchestrator,
    pub breaker: Arc<CircuitBreaker>,
    pub cache: Arc<ApiCache>,
    pub metrics: Arc<PipelineMetrics>,
}

pub fn build_orchestrator(
    api: Arc<MockFootballApi>,
    config: OrchestratorConfig,
    failure_threshold: u32,
    breaker_timeout: Duration,
) -> OrchestratorFixture {
    let metrics = Arc::new(PipelineMetrics::new().expect("metrics"));
    let knowledge_base = Arc::new(KnowledgeBase::new());
    let cache = Arc::new(ApiCache::new(
        Arc::new(MemoryStore::new()),
        knowledge_base,
        Arc::clone(&metrics),
    ));
    let breaker = Arc::new(CircuitBreaker::new(
        failure_threshold,
        breaker_timeout,
        Arc::clone(&metrics),
    ));
    let orchestrator = ApiOrchestrator::new(
        api,
        Arc::clone(&cache),
        Arc::clone(&breaker),
        Arc::clone(&metrics),
        config,
    );
    OrchestratorFixture { orchestrator, breaker, cache, metrics }
}

/// Canned team-search payload in the upstream's shape.
pub fn team_response(id: i64, name: &str) -> Value {
    json!({ "response": [ { "team": { "id": id, "name": name }, "venue": { "id": 100 + id } } ] })
}

/// Canned fixture payload with a status code.
pub fn fixture_response(fixture_id: i64, status: &str) -> Value {
    json!({
        "response": [
            {
                "fixture": { "id": fixture_id, "status": { "short": status } },
                "goals": { "home": 2, "away": 1 }
            }
        ]
    })
}
