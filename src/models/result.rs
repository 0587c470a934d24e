//! Execution and Pipeline Results
//!
//! Per-call outcomes, the aggregated execution result, and the evidence
//! bundle handed back to the embedder.

use super::entities::{ExtractedEntities, Language, QuestionType, Slot};
use super::plan::ExecutionPlan;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Outcome of one planned call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    pub call_id: String,
    pub endpoint_name: String,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub from_cache: bool,
    pub execution_time_ms: u64,
}

impl CallResult {
    pub fn success(
        call_id: impl Into<String>,
        endpoint_name: impl Into<String>,
        data: Value,
        from_cache: bool,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            endpoint_name: endpoint_name.into(),
            success: true,
            data: Some(data),
            error: None,
            from_cache,
            execution_time_ms,
        }
    }

    pub fn failure(
        call_id: impl Into<String>,
        endpoint_name: impl Into<String>,
        error: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            endpoint_name: endpoint_name.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            from_cache: false,
            execution_time_ms,
        }
    }
}

/// Aggregated outcome of a whole plan.
///
/// `collected_data` holds every successful payload twice, under the
/// `call_id` and under the `endpoint_name`. When the same endpoint runs
/// twice in one plan the name alias is last-writer-wins; consumers that
/// care about ambiguity use the `call_id` alias.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub call_results: Vec<CallResult>,
    pub collected_data: HashMap<String, Value>,
    pub total_api_calls: u32,
    pub total_cache_hits: u32,
    pub total_execution_time_ms: u64,
    pub errors: Vec<String>,
    /// True iff `errors` is empty
    pub success: bool,
}

impl ExecutionResult {
    /// Seals the result, deriving `success` from the error list.
    pub fn finish(mut self) -> Self {
        self.success = self.errors.is_empty();
        self
    }

    /// Result for a plan that failed before any call was dispatched.
    pub fn planning_failure(error: impl std::fmt::Display) -> Self {
        Self {
            errors: vec![format!("planning: {error}")],
            ..Default::default()
        }
        .finish()
    }
}

// ============================================================================
// Pipeline Output
// ============================================================================

/// Clarification payload returned when the question is incomplete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub language: Language,
    pub missing_info: Vec<Slot>,
    pub questions: Vec<String>,
}

/// Timings of the pipeline stages for one invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub validation_ms: u64,
    pub planning_ms: u64,
    pub execution_ms: u64,
    pub total_ms: u64,
}

/// Structured evidence handed to the downstream formatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub request_id: String,
    pub question_type: QuestionType,
    pub confidence: f64,
    pub language: Language,
    pub entities: ExtractedEntities,
    /// Kept for introspection and debugging
    pub plan: ExecutionPlan,
    pub execution: ExecutionResult,
    pub stats: PipelineStats,
}

/// What `process` returns: either questions back to the user or evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineResponse {
    Clarification(ClarificationRequest),
    Bundle(Box<EvidenceBundle>),
}

impl PipelineResponse {
    pub fn as_bundle(&self) -> Option<&EvidenceBundle> {
        match self {
            Self::Bundle(bundle) => Some(bundle),
            Self::Clarification(_) => None,
        }
    }

    pub fn as_clarification(&self) -> Option<&ClarificationRequest> {
        match self {
            Self::Clarification(request) => Some(request),
            Self::Bundle(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_finish_derives_success() {
        let ok = ExecutionResult::default().finish();
        assert!(ok.success);

        let failed = ExecutionResult {
            errors: vec!["call_1: failed after 3 retries: timeout".to_string()],
            ..Default::default()
        }
        .finish();
        assert!(!failed.success);
    }

    #[test]
    fn test_planning_failure_shape() {
        let result = ExecutionResult::planning_failure("dependency cycle involving call_2");
        assert!(!result.success);
        assert_eq!(result.total_api_calls, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("planning: "));
    }

    #[test]
    fn test_call_result_constructors() {
        let ok = CallResult::success("call_0", "team_search", json!({"response": []}), true, 3);
        assert!(ok.success && ok.from_cache && ok.error.is_none());

        let failed = CallResult::failure("call_1", "standings", "circuit breaker open", 0);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("circuit breaker open"));
        assert!(failed.data.is_none());
    }
}
