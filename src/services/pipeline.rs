//! Autonomous Pipeline
//!
//! Glue over validator, planner and orchestrator: one `process` call
//! turns a question into either a clarification request or a structured
//! evidence bundle. No exception escapes here short of a misconfigured
//! catalog.

use crate::config::Config;
use crate::metrics::PipelineMetrics;
use crate::models::{
    ClarificationRequest, EvidenceBundle, ExecutionPlan, ExecutionResult, PipelineResponse,
    PipelineStats, StructuredContext,
};
use crate::services::cache::{ApiCache, CacheStore};
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::football_client::FootballApi;
use crate::services::knowledge_base::KnowledgeBase;
use crate::services::orchestrator::{ApiOrchestrator, OrchestratorConfig};
use crate::services::planner::EndpointPlanner;
use crate::services::validator::QuestionValidator;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

pub struct AutonomousPipeline {
    validator: QuestionValidator,
    planner: EndpointPlanner,
    orchestrator: ApiOrchestrator,
    metrics: Arc<PipelineMetrics>,
}

impl AutonomousPipeline {
    /// Wires the full stack over an upstream client and a cache store.
    pub fn new(
        api: Arc<dyn FootballApi>,
        store: Arc<dyn CacheStore>,
        config: &Config,
    ) -> Result<Self, prometheus::Error> {
        let metrics = Arc::new(PipelineMetrics::new()?);
        Ok(Self::with_metrics(api, store, config, metrics))
    }

    /// Same wiring with an externally owned metrics registry (the
    /// embedder usually wants to scrape it).
    pub fn with_metrics(
        api: Arc<dyn FootballApi>,
        store: Arc<dyn CacheStore>,
        config: &Config,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let knowledge_base = Arc::new(KnowledgeBase::new());
        let cache = Arc::new(ApiCache::new(store, Arc::clone(&knowledge_base), Arc::clone(&metrics)));
        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker.failure_threshold,
            config.breaker.timeout(),
            Arc::clone(&metrics),
        ));
        let orchestrator_config = OrchestratorConfig {
            max_retries: config.retry.max_retries,
            retry_delay: config.retry.delay(),
            plan_timeout: config.pipeline.plan_timeout(),
        };

        Self {
            validator: QuestionValidator::new(Arc::clone(&metrics)),
            planner: EndpointPlanner::new(
                Arc::clone(&knowledge_base),
                Arc::clone(&cache),
                Arc::clone(&metrics),
            ),
            orchestrator: ApiOrchestrator::new(api, cache, breaker, Arc::clone(&metrics), orchestrator_config),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Validates, plans and executes one question.
    pub async fn process(
        &self,
        question: &str,
        caller_context: Option<&StructuredContext>,
    ) -> PipelineResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("pipeline", request_id = %request_id);
        self.process_inner(question, caller_context, request_id)
            .instrument(span)
            .await
    }

    async fn process_inner(
        &self,
        question: &str,
        caller_context: Option<&StructuredContext>,
        request_id: String,
    ) -> PipelineResponse {
        let started = Instant::now();
        let empty_context = StructuredContext::default();
        let context = caller_context.unwrap_or(&empty_context);
        let mut stats = PipelineStats::default();

        let validation_started = Instant::now();
        let validation = self.validator.validate(question, context);
        stats.validation_ms = validation_started.elapsed().as_millis() as u64;

        if !validation.is_complete {
            tracing::info!(
                question_type = validation.question_type.as_str(),
                missing = ?validation.missing_info,
                "incomplete question, asking for clarification"
            );
            self.metrics.clarification_requests_total.inc();
            return PipelineResponse::Clarification(ClarificationRequest {
                language: validation.language,
                missing_info: validation.missing_info,
                questions: validation.clarification_questions,
            });
        }

        let planning_started = Instant::now();
        let (plan, execution) = match self.planner.plan(&validation, context).await {
            Ok(plan) => {
                stats.planning_ms = planning_started.elapsed().as_millis() as u64;
                let execution_started = Instant::now();
                let execution = self.orchestrator.execute(&plan).await;
                stats.execution_ms = execution_started.elapsed().as_millis() as u64;
                (plan, execution)
            }
            Err(e) => {
                stats.planning_ms = planning_started.elapsed().as_millis() as u64;
                tracing::error!(error = %e, "planning failed, no calls executed");
                (ExecutionPlan::default(), ExecutionResult::planning_failure(e))
            }
        };

        stats.total_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            question_type = validation.question_type.as_str(),
            calls = plan.total_calls(),
            api_calls = execution.total_api_calls,
            cache_hits = execution.total_cache_hits,
            errors = execution.errors.len(),
            total_ms = stats.total_ms,
            "pipeline finished"
        );

        PipelineResponse::Bundle(Box::new(EvidenceBundle {
            request_id,
            question_type: validation.question_type,
            confidence: validation.confidence,
            language: validation.language,
            entities: validation.entities,
            plan,
            execution,
            stats,
        }))
    }
}
