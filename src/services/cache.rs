//! Shared API Response Cache
//!
//! Process-wide cache keyed by normalized (endpoint, params) so that
//! logically equivalent requests collapse to one entry. TTLs come from
//! the knowledge base. Storage errors never reach the pipeline: a
//! failing read is a miss, a failing write is dropped.

use crate::metrics::PipelineMetrics;
use crate::services::knowledge_base::{KnowledgeBase, TTL_NO_EXPIRY, TTL_SKIP};
use crate::utils::normalize::{
    find_player, find_team, normalize_date, normalize_h2h, normalize_league, normalize_team,
    normalize_token,
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Backing-store failure. Confined to this module: the cache facade
/// logs and degrades instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum CacheStoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid invalidation pattern: {0}")]
    BadPattern(String),
}

// ============================================================================
// Store Trait
// ============================================================================

/// Minimal key-value contract a backing store must offer, mirroring a
/// Redis-like service: get, set with optional expiry, glob deletion,
/// flush. `ttl = None` stores without expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheStoreError>;

    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheStoreError>;

    /// Removes keys matching a glob pattern (`*`, `?`). Returns how many
    /// were deleted.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheStoreError>;

    async fn flush(&self) -> Result<(), CacheStoreError>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// `DashMap`-backed store. Expiry is lazy on read plus an opportunistic
/// sweep once the map grows past a threshold.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

const SWEEP_THRESHOLD: usize = 4096;

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }
}

fn glob_to_regex(pattern: &str) -> Result<regex::Regex, CacheStoreError> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    regex::Regex::new(&expr).map_err(|e| CacheStoreError::BadPattern(e.to_string()))
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheStoreError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheStoreError> {
        if self.entries.len() >= SWEEP_THRESHOLD {
            self.purge_expired();
        }
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.entries.insert(key.to_string(), StoredEntry { value, expires_at });
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheStoreError> {
        let matcher = glob_to_regex(pattern)?;
        let before = self.entries.len();
        self.entries.retain(|key, entry| !entry.is_expired() && !matcher.is_match(key));
        Ok((before - self.entries.len()) as u64)
    }

    async fn flush(&self) -> Result<(), CacheStoreError> {
        self.entries.clear();
        Ok(())
    }
}

// ============================================================================
// Key Normalization
// ============================================================================

const KEY_PREFIX: &str = "lucide:cache";

/// Parameter names carrying team spellings.
const TEAM_PARAMS: &[&str] = &["team", "home", "away", "team1", "team2"];
/// Parameter names carrying dates.
const DATE_PARAMS: &[&str] = &["date", "from", "to"];

fn normalize_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => normalize_token(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => normalize_token(&other.to_string()),
    }
}

/// Free-text lookups (`search`, `name`) may name a club or a player;
/// try both dictionaries before the generic normalizer.
fn normalize_lookup(value: &str) -> String {
    if let Some(team) = find_team(value) {
        return team.canonical.clone();
    }
    if let Some(player) = find_player(value) {
        return player.canonical.clone();
    }
    normalize_token(value)
}

fn normalize_param(name: &str, value: &Value) -> String {
    let Value::String(text) = value else {
        return normalize_scalar(value);
    };
    if TEAM_PARAMS.contains(&name) {
        normalize_team(text)
    } else if name == "league" {
        normalize_league(text)
    } else if name == "player" {
        crate::utils::normalize::normalize_player(text)
    } else if name == "h2h" {
        normalize_h2h(text)
    } else if DATE_PARAMS.contains(&name) {
        normalize_date(text).unwrap_or_else(|| normalize_token(text))
    } else if name == "search" || name == "name" {
        normalize_lookup(text)
    } else {
        normalize_token(text)
    }
}

/// Builds the cache key for an endpoint and parameter map.
///
/// Null parameters are dropped, team/league/player/date spellings are
/// canonicalized, H2H pairs are order-insensitive, and the remainder
/// is serialized key-sorted, so semantically equivalent lookups always
/// produce the same key.
pub fn cache_key(endpoint_name: &str, params: &BTreeMap<String, Value>) -> String {
    let mut parts = Vec::with_capacity(params.len());
    for (name, value) in params {
        if value.is_null() {
            continue;
        }
        parts.push(format!("{name}={}", normalize_param(name, value)));
    }
    format!("{KEY_PREFIX}:{endpoint_name}:{}", parts.join("&"))
}

// ============================================================================
// Cache Facade
// ============================================================================

/// The pipeline's view of the cache: normalized keys, knowledge-base
/// TTLs, metrics, and never-fail semantics.
pub struct ApiCache {
    store: Arc<dyn CacheStore>,
    knowledge_base: Arc<KnowledgeBase>,
    metrics: Arc<PipelineMetrics>,
}

impl ApiCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        knowledge_base: Arc<KnowledgeBase>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self { store, knowledge_base, metrics }
    }

    /// Cache lookup. A backing-store error is logged and counted as a
    /// miss.
    pub async fn get(&self, endpoint_name: &str, params: &BTreeMap<String, Value>) -> Option<Value> {
        let key = cache_key(endpoint_name, params);
        match self.store.get(&key).await {
            Ok(Some(value)) => {
                tracing::debug!(endpoint = endpoint_name, %key, "cache hit");
                self.metrics.record_cache_hit(endpoint_name);
                Some(value)
            }
            Ok(None) => {
                tracing::debug!(endpoint = endpoint_name, %key, "cache miss");
                self.metrics.record_cache_miss(endpoint_name);
                None
            }
            Err(e) => {
                tracing::warn!(endpoint = endpoint_name, error = %e, "cache read failed, treating as miss");
                self.metrics.record_cache_miss(endpoint_name);
                None
            }
        }
    }

    /// Cache write. The TTL comes from the knowledge base; a zero TTL
    /// skips the write entirely and a backing-store error is swallowed.
    pub async fn set(
        &self,
        endpoint_name: &str,
        params: &BTreeMap<String, Value>,
        value: Value,
        match_status: Option<&str>,
    ) {
        let ttl_secs = self.knowledge_base.cache_ttl(endpoint_name, match_status);
        if ttl_secs == TTL_SKIP {
            tracing::debug!(endpoint = endpoint_name, "no-cache policy, skipping write");
            return;
        }
        let ttl = if ttl_secs == TTL_NO_EXPIRY {
            None
        } else {
            Some(Duration::from_secs(ttl_secs as u64))
        };

        let key = cache_key(endpoint_name, params);
        match self.store.set(&key, value, ttl).await {
            Ok(()) => {
                self.metrics
                    .record_cache_set(endpoint_name, ttl.map(|d| d.as_secs()));
                tracing::debug!(endpoint = endpoint_name, %key, ttl_secs, "cache write");
            }
            Err(e) => {
                tracing::warn!(endpoint = endpoint_name, error = %e, "cache write failed, dropping");
            }
        }
    }

    /// Removes all keys matching a glob pattern (relative patterns are
    /// anchored under the cache prefix).
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        let full = if pattern.starts_with(KEY_PREFIX) {
            pattern.to_string()
        } else {
            format!("{KEY_PREFIX}:{pattern}")
        };
        match self.store.delete_pattern(&full).await {
            Ok(count) => {
                tracing::info!(pattern = %full, deleted = count, "cache invalidation");
                count
            }
            Err(e) => {
                tracing::warn!(pattern = %full, error = %e, "cache invalidation failed");
                0
            }
        }
    }

    pub async fn clear_all(&self) {
        if let Err(e) = self.store.flush().await {
            tracing::warn!(error = %e, "cache flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    fn test_cache() -> ApiCache {
        ApiCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(KnowledgeBase::new()),
            Arc::new(PipelineMetrics::new().unwrap()),
        )
    }

    #[test]
    fn test_key_drops_nulls_and_sorts() {
        let a = params(&[("league", json!("Ligue 1")), ("season", json!(2025)), ("team", Value::Null)]);
        let b = params(&[("season", json!(2025)), ("league", json!("L1"))]);
        assert_eq!(cache_key("standings", &a), cache_key("standings", &b));
    }

    #[test]
    fn test_key_team_alias_variants_collide() {
        let a = params(&[("search", json!("PSG"))]);
        let b = params(&[("search", json!("Paris Saint-Germain"))]);
        let c = params(&[("search", json!("paris saint germain"))]);
        let key = cache_key("team_search", &a);
        assert_eq!(key, cache_key("team_search", &b));
        assert_eq!(key, cache_key("team_search", &c));
        assert!(key.starts_with("lucide:cache:team_search:"));
    }

    #[test]
    fn test_key_date_variants_collide() {
        let a = params(&[("date", json!("2026-08-01")), ("team", json!(85))]);
        let b = params(&[("date", json!("01/08/2026")), ("team", json!(85))]);
        let c = params(&[("date", json!("08-01-2026")), ("team", json!(85))]);
        assert_eq!(cache_key("fixtures_by_team", &a), cache_key("fixtures_by_team", &b));
        assert_eq!(cache_key("fixtures_by_team", &a), cache_key("fixtures_by_team", &c));
    }

    #[test]
    fn test_key_h2h_order_insensitive() {
        let a = params(&[("h2h", json!("PSG-Lyon"))]);
        let b = params(&[("h2h", json!("lyon-psg"))]);
        assert_eq!(cache_key("head_to_head", &a), cache_key("head_to_head", &b));
    }

    #[tokio::test]
    async fn test_memory_store_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", json!(1), Some(Duration::from_millis(30)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(1)));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_pattern_delete() {
        let store = MemoryStore::new();
        store.set("lucide:cache:standings:league=ligue_1", json!(1), None).await.unwrap();
        store.set("lucide:cache:standings:league=la_liga", json!(2), None).await.unwrap();
        store.set("lucide:cache:team_search:search=psg", json!(3), None).await.unwrap();

        let deleted = store.delete_pattern("lucide:cache:standings:*").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_round_trip_and_metrics() {
        let cache = test_cache();
        let p = params(&[("league", json!("Ligue 1")), ("season", json!(2025))]);

        assert!(cache.get("standings", &p).await.is_none());
        cache.set("standings", &p, json!({"response": ["table"]}), None).await;

        let variant = params(&[("league", json!("L1")), ("season", json!(2025))]);
        let hit = cache.get("standings", &variant).await;
        assert_eq!(hit, Some(json!({"response": ["table"]})));
    }

    #[tokio::test]
    async fn test_no_cache_policy_skips_write() {
        let cache = test_cache();
        let p = params(&[("live", json!("all"))]);
        cache.set("fixtures_live", &p, json!({"response": []}), None).await;
        assert!(cache.get("fixtures_live", &p).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_glob() {
        let cache = test_cache();
        let p1 = params(&[("league", json!("Ligue 1")), ("season", json!(2025))]);
        let p2 = params(&[("search", json!("PSG"))]);
        cache.set("standings", &p1, json!(1), None).await;
        cache.set("team_search", &p2, json!(2), None).await;

        let deleted = cache.invalidate("standings:*").await;
        assert_eq!(deleted, 1);
        assert!(cache.get("standings", &p1).await.is_none());
        assert!(cache.get("team_search", &p2).await.is_some());
    }
}
