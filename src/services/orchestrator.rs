//! API Orchestrator
//!
//! Executes a plan level by level: parallel dispatch within a level,
//! placeholder substitution at level boundaries, cache consultation on
//! every call, linear-backoff retries, circuit breaking and
//! partial-failure tolerance. A failing call never aborts the plan.

use crate::metrics::PipelineMetrics;
use crate::models::plan::embedded_placeholders;
use crate::models::{CallResult, EndpointCall, ExecutionPlan, ExecutionResult, ParamValue};
use crate::services::cache::ApiCache;
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::football_client::FootballApi;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Resilience tuning for plan execution.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub plan_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            plan_timeout: Duration::from_secs(30),
        }
    }
}

pub struct ApiOrchestrator {
    api: Arc<dyn FootballApi>,
    cache: Arc<ApiCache>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<PipelineMetrics>,
    config: OrchestratorConfig,
}

impl ApiOrchestrator {
    pub fn new(
        api: Arc<dyn FootballApi>,
        cache: Arc<ApiCache>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<PipelineMetrics>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { api, cache, breaker, metrics, config }
    }

    /// Runs the whole plan. Always returns a result: per-call failures
    /// are aggregated into `errors`, never raised.
    pub async fn execute(&self, plan: &ExecutionPlan) -> ExecutionResult {
        let started = Instant::now();
        let levels = match plan.levels() {
            Ok(levels) => levels,
            Err(e) => return ExecutionResult::planning_failure(e),
        };

        let mut result = ExecutionResult::default();

        // Data the planner already found in cache is surfaced as
        // from_cache results without reissuing calls.
        for (index, entry) in plan.presatisfied.iter().enumerate() {
            let call_id = format!("cached_{index}");
            result
                .collected_data
                .insert(call_id.clone(), entry.data.clone());
            result
                .collected_data
                .insert(entry.endpoint_name.clone(), entry.data.clone());
            result.call_results.push(CallResult::success(
                call_id,
                entry.endpoint_name.clone(),
                entry.data.clone(),
                true,
                0,
            ));
            result.total_cache_hits += 1;
        }

        let deadline = tokio::time::Instant::now() + self.config.plan_timeout;
        let mut timed_out = false;

        for level in &levels {
            if timed_out {
                for call in level {
                    result.errors.push(format!("{}: not executed, plan timeout exceeded", call.call_id));
                    result.call_results.push(CallResult::failure(
                        call.call_id.clone(),
                        call.endpoint_name.clone(),
                        "plan timeout exceeded",
                        0,
                    ));
                }
                continue;
            }

            // Level boundary: placeholders become concrete values here.
            let mut join_set: JoinSet<(CallResult, u32)> = JoinSet::new();
            let mut pending: HashSet<String> = HashSet::new();
            for call in level {
                let params = substitute_params(call, &result.collected_data);
                pending.insert(call.call_id.clone());
                let task = CallTask {
                    api: Arc::clone(&self.api),
                    cache: Arc::clone(&self.cache),
                    breaker: Arc::clone(&self.breaker),
                    metrics: Arc::clone(&self.metrics),
                    config: self.config.clone(),
                    call: call.clone(),
                    params,
                };
                join_set.spawn(task.run());
            }

            while !join_set.is_empty() {
                match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                    Ok(Some(Ok((call_result, attempts)))) => {
                        pending.remove(&call_result.call_id);
                        if attempts > 0 {
                            result.total_api_calls += 1;
                        }
                        if call_result.from_cache {
                            result.total_cache_hits += 1;
                        }
                        if call_result.success {
                            if let Some(data) = &call_result.data {
                                result
                                    .collected_data
                                    .insert(call_result.call_id.clone(), data.clone());
                                result
                                    .collected_data
                                    .insert(call_result.endpoint_name.clone(), data.clone());
                            }
                        } else if let Some(error) = &call_result.error {
                            result.errors.push(format!("{}: {error}", call_result.call_id));
                        }
                        result.call_results.push(call_result);
                    }
                    Ok(Some(Err(join_error))) => {
                        tracing::error!(error = %join_error, "call task aborted");
                    }
                    Ok(None) => break,
                    Err(_) => {
                        tracing::warn!("plan timeout reached, cancelling in-flight calls");
                        join_set.abort_all();
                        timed_out = true;
                        break;
                    }
                }
            }

            // Anything still pending either hit the deadline or its
            // task died; both must show up in the result.
            let missing_error =
                if timed_out { "cancelled by plan timeout" } else { "call task failed" };
            for call_id in pending {
                let endpoint = level
                    .iter()
                    .find(|c| c.call_id == call_id)
                    .map(|c| c.endpoint_name.clone())
                    .unwrap_or_default();
                result.errors.push(format!("{call_id}: {missing_error}"));
                result.call_results.push(CallResult::failure(
                    call_id,
                    endpoint,
                    missing_error,
                    0,
                ));
            }
        }

        result.total_execution_time_ms = started.elapsed().as_millis() as u64;
        result.finish()
    }
}

// ============================================================================
// Parameter Substitution
// ============================================================================

/// Resolves every `<from_X>` placeholder against data collected so far.
/// A placeholder that cannot be resolved is left as-is; the upstream
/// will then reject the call and the normal error path applies.
fn substitute_params(
    call: &EndpointCall,
    collected: &HashMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut resolved = BTreeMap::new();
    for (name, value) in &call.params {
        let concrete = match value {
            ParamValue::Reference(source) => match extract_value(collected, source, name) {
                Some(found) => found,
                None => Value::String(format!("<from_{source}>")),
            },
            ParamValue::Literal(Value::String(text)) if !embedded_placeholders(text).is_empty() => {
                let mut rendered = text.clone();
                for source in embedded_placeholders(text) {
                    if let Some(found) = extract_value(collected, &source, name) {
                        rendered = rendered
                            .replace(&format!("<from_{source}>"), &scalar_to_string(&found));
                    }
                }
                Value::String(rendered)
            }
            ParamValue::Literal(other) => other.clone(),
        };
        resolved.insert(name.clone(), concrete);
    }
    resolved
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_scalar(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Some(value.clone()),
        _ => None,
    }
}

/// Ad-hoc extraction over the upstream response shape, tried in order:
/// direct key, `response[0][key]`, `response[0].team.id`,
/// `response[0].fixture.id`, `response[0].player.id`, then
/// `response[0].id` for id-shaped keys. Scalars only; the first match
/// wins and `response[0]` is taken as canonical.
fn extract_value(collected: &HashMap<String, Value>, source: &str, key: &str) -> Option<Value> {
    let data = collected.get(source)?;

    if let Some(found) = data.get(key).and_then(as_scalar) {
        return Some(found);
    }
    let first = data.get("response").and_then(|r| r.get(0));
    if let Some(first) = first {
        if let Some(found) = first.get(key).and_then(as_scalar) {
            return Some(found);
        }
        for section in ["team", "fixture", "player"] {
            if let Some(found) = first
                .get(section)
                .and_then(|s| s.get("id"))
                .and_then(as_scalar)
            {
                return Some(found);
            }
        }
        if (key == "id" || key.ends_with("_id"))
            && let Some(found) = first.get("id").and_then(as_scalar)
        {
            return Some(found);
        }
    }
    None
}

/// API-Football carries the match status at
/// `response[0].fixture.status.short`; adaptive TTLs key off it.
fn extract_match_status(data: &Value) -> Option<&str> {
    data.get("response")?
        .get(0)?
        .get("fixture")?
        .get("status")?
        .get("short")?
        .as_str()
}

// ============================================================================
// Per-Call Task
// ============================================================================

/// Everything one call needs, owned, so the task can run detached.
struct CallTask {
    api: Arc<dyn FootballApi>,
    cache: Arc<ApiCache>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<PipelineMetrics>,
    config: OrchestratorConfig,
    call: EndpointCall,
    params: BTreeMap<String, Value>,
}

impl CallTask {
    /// Runs one call to completion: breaker gate, cache lookup, then
    /// retried upstream attempts. Returns the result and how many
    /// upstream attempts were made.
    async fn run(self) -> (CallResult, u32) {
        let started = Instant::now();
        let call_id = self.call.call_id.clone();
        let endpoint = self.call.endpoint_name.clone();

        if self.breaker.is_blocked() {
            self.metrics.api_call_failures_total.inc();
            return (CallResult::failure(call_id, endpoint, "circuit breaker open", 0), 0);
        }

        if let Some(data) = self.cache.get(&endpoint, &self.params).await {
            let elapsed = started.elapsed();
            self.metrics
                .call_duration_seconds
                .with_label_values(&[endpoint.as_str()])
                .observe(elapsed.as_secs_f64());
            return (
                CallResult::success(call_id, endpoint, data, true, elapsed.as_millis() as u64),
                0,
            );
        }

        let mut attempts = 0u32;
        let mut last_error = String::new();
        while attempts < self.config.max_retries {
            if attempts > 0 {
                self.metrics.retries_total.inc();
                tokio::time::sleep(self.config.retry_delay * attempts).await;
            }
            if !self.breaker.try_acquire() {
                self.metrics.api_call_failures_total.inc();
                return (
                    CallResult::failure(
                        call_id,
                        endpoint,
                        "circuit breaker open",
                        started.elapsed().as_millis() as u64,
                    ),
                    attempts,
                );
            }

            attempts += 1;
            self.metrics.api_calls_total.inc();
            match self.api.call(&endpoint, &self.params).await {
                Ok(data) => {
                    self.breaker.record_success();
                    let status = extract_match_status(&data).map(str::to_string);
                    self.cache
                        .set(&endpoint, &self.params, data.clone(), status.as_deref())
                        .await;
                    let elapsed = started.elapsed();
                    self.metrics
                        .call_duration_seconds
                        .with_label_values(&[endpoint.as_str()])
                        .observe(elapsed.as_secs_f64());
                    return (
                        CallResult::success(
                            call_id,
                            endpoint,
                            data,
                            false,
                            elapsed.as_millis() as u64,
                        ),
                        attempts,
                    );
                }
                Err(e) => {
                    self.breaker.record_failure();
                    last_error = e.to_string();
                    tracing::warn!(
                        call = %call_id,
                        endpoint = %endpoint,
                        attempt = attempts,
                        error = %last_error,
                        "upstream call failed"
                    );
                }
            }
        }

        self.metrics.api_call_failures_total.inc();
        let error = format!("failed after {} retries: {last_error}", self.config.max_retries);
        (
            CallResult::failure(call_id, endpoint, error, started.elapsed().as_millis() as u64),
            attempts,
        )
    }
}
