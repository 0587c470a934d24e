//! Pipeline Metrics
//!
//! Prometheus instruments for every stage of the autonomous pipeline,
//! registered on a dedicated registry the embedder can scrape or merge.
//!
//! # Usage
//!
//! ```rust,ignore
//! let metrics = PipelineMetrics::new()?;
//! metrics.cache_hits_total.with_label_values(&["standings"]).inc();
//! println!("{}", metrics.gather_text()?);
//! ```

use prometheus::{
    Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-call latency buckets (seconds)
const CALL_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// TTL buckets (seconds) for values actually written to the cache
const TTL_BUCKETS: &[f64] = &[30.0, 300.0, 600.0, 3600.0, 86400.0, 604800.0];

/// All pipeline instruments, shared process-wide behind an `Arc`.
pub struct PipelineMetrics {
    registry: Registry,

    // ============ Validator ============
    /// Validations by outcome (`complete`, `incomplete`)
    pub validations_total: IntCounterVec,
    /// Clarification responses returned to callers
    pub clarification_requests_total: IntCounter,

    // ============ Planner ============
    /// Plans successfully generated
    pub plans_generated_total: IntCounter,
    /// Calls placed into generated plans
    pub planned_calls_total: IntCounter,

    // ============ Orchestrator ============
    /// Upstream API calls actually dispatched
    pub api_calls_total: IntCounter,
    /// Calls that failed after exhausting retries (or short-circuited)
    pub api_call_failures_total: IntCounter,
    /// Individual retry attempts beyond the first
    pub retries_total: IntCounter,
    /// Breaker transitions by target state (`open`, `half_open`, `closed`)
    pub breaker_transitions_total: IntCounterVec,
    /// Per-call wall time by endpoint
    pub call_duration_seconds: HistogramVec,

    // ============ Cache ============
    /// Cache hits by endpoint
    pub cache_hits_total: IntCounterVec,
    /// Cache misses by endpoint
    pub cache_misses_total: IntCounterVec,
    /// Cache writes by endpoint
    pub cache_sets_total: IntCounterVec,
    /// Rolling hits / (hits + misses)
    pub cache_hit_rate: Gauge,
    /// TTLs applied on write
    pub cache_ttl_seconds: Histogram,

    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let validations_total = IntCounterVec::new(
            Opts::new("lucide_validations_total", "Question validations by outcome"),
            &["result"],
        )?;
        let clarification_requests_total = IntCounter::new(
            "lucide_clarification_requests_total",
            "Clarification responses returned to callers",
        )?;
        let plans_generated_total =
            IntCounter::new("lucide_plans_generated_total", "Execution plans generated")?;
        let planned_calls_total =
            IntCounter::new("lucide_planned_calls_total", "Endpoint calls placed into plans")?;
        let api_calls_total =
            IntCounter::new("lucide_api_calls_total", "Upstream API calls dispatched")?;
        let api_call_failures_total = IntCounter::new(
            "lucide_api_call_failures_total",
            "Calls failed after retries or breaker short-circuit",
        )?;
        let retries_total =
            IntCounter::new("lucide_retries_total", "Retry attempts beyond the first")?;
        let breaker_transitions_total = IntCounterVec::new(
            Opts::new("lucide_breaker_transitions_total", "Circuit breaker transitions"),
            &["to_state"],
        )?;
        let call_duration_seconds = HistogramVec::new(
            HistogramOpts::new("lucide_call_duration_seconds", "Per-call wall time")
                .buckets(CALL_LATENCY_BUCKETS.to_vec()),
            &["endpoint"],
        )?;
        let cache_hits_total = IntCounterVec::new(
            Opts::new("lucide_cache_hits_total", "Cache hits"),
            &["endpoint"],
        )?;
        let cache_misses_total = IntCounterVec::new(
            Opts::new("lucide_cache_misses_total", "Cache misses"),
            &["endpoint"],
        )?;
        let cache_sets_total = IntCounterVec::new(
            Opts::new("lucide_cache_sets_total", "Cache writes"),
            &["endpoint"],
        )?;
        let cache_hit_rate =
            Gauge::new("lucide_cache_hit_rate", "hits / (hits + misses) since start")?;
        let cache_ttl_seconds = Histogram::with_opts(
            HistogramOpts::new("lucide_cache_ttl_seconds", "TTLs applied on cache write")
                .buckets(TTL_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(validations_total.clone()))?;
        registry.register(Box::new(clarification_requests_total.clone()))?;
        registry.register(Box::new(plans_generated_total.clone()))?;
        registry.register(Box::new(planned_calls_total.clone()))?;
        registry.register(Box::new(api_calls_total.clone()))?;
        registry.register(Box::new(api_call_failures_total.clone()))?;
        registry.register(Box::new(retries_total.clone()))?;
        registry.register(Box::new(breaker_transitions_total.clone()))?;
        registry.register(Box::new(call_duration_seconds.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(cache_misses_total.clone()))?;
        registry.register(Box::new(cache_sets_total.clone()))?;
        registry.register(Box::new(cache_hit_rate.clone()))?;
        registry.register(Box::new(cache_ttl_seconds.clone()))?;

        Ok(Self {
            registry,
            validations_total,
            clarification_requests_total,
            plans_generated_total,
            planned_calls_total,
            api_calls_total,
            api_call_failures_total,
            retries_total,
            breaker_transitions_total,
            call_duration_seconds,
            cache_hits_total,
            cache_misses_total,
            cache_sets_total,
            cache_hit_rate,
            cache_ttl_seconds,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }

    /// The registry carrying every pipeline instrument.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_validation(&self, complete: bool) {
        let result = if complete { "complete" } else { "incomplete" };
        self.validations_total.with_label_values(&[result]).inc();
    }

    pub fn record_cache_hit(&self, endpoint: &str) {
        self.cache_hits_total.with_label_values(&[endpoint]).inc();
        self.hit_count.fetch_add(1, Ordering::Relaxed);
        self.refresh_hit_rate();
    }

    pub fn record_cache_miss(&self, endpoint: &str) {
        self.cache_misses_total.with_label_values(&[endpoint]).inc();
        self.miss_count.fetch_add(1, Ordering::Relaxed);
        self.refresh_hit_rate();
    }

    pub fn record_cache_set(&self, endpoint: &str, ttl_seconds: Option<u64>) {
        self.cache_sets_total.with_label_values(&[endpoint]).inc();
        if let Some(ttl) = ttl_seconds {
            self.cache_ttl_seconds.observe(ttl as f64);
        }
    }

    fn refresh_hit_rate(&self) {
        let hits = self.hit_count.load(Ordering::Relaxed);
        let misses = self.miss_count.load(Ordering::Relaxed);
        let total = hits + misses;
        if total > 0 {
            self.cache_hit_rate.set(hits as f64 / total as f64);
        }
    }

    /// Text exposition of the whole registry.
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
