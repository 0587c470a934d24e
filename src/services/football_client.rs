//! Football API Client
//!
//! The upstream seam: the orchestrator depends on the `FootballApi`
//! trait only. `ApiFootballClient` is the production implementation
//! speaking to API-Football v3 over HTTPS.

use crate::services::knowledge_base::KnowledgeBase;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Upstream call failures. The orchestrator does not distinguish among
/// these beyond counting them toward retries and the breaker.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error {code}: {body}")]
    Status { code: u16, body: String },

    #[error("response decoding error: {0}")]
    Decode(String),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
}

/// Contract the embedder must supply: one named endpoint call, opaque
/// structured response (typically `{ "response": [...] }`).
#[async_trait]
pub trait FootballApi: Send + Sync {
    async fn call(
        &self,
        endpoint_name: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<Value, ApiError>;
}

// ============================================================================
// API-Football v3 Client
// ============================================================================

/// Production client: path templates from the catalog, remaining
/// parameters as query string, `x-apisports-key` auth.
pub struct ApiFootballClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    knowledge_base: Arc<KnowledgeBase>,
    timeout: Duration,
}

impl ApiFootballClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        knowledge_base: Arc<KnowledgeBase>,
        timeout: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            knowledge_base,
            timeout,
        }
    }

    fn param_string(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Fills `{param}` holes from the parameter map; whatever is left
    /// over becomes the query string.
    fn build_url(&self, path: &str, params: &BTreeMap<String, Value>) -> (String, Vec<(String, String)>) {
        let mut remaining: BTreeMap<&String, &Value> = params.iter().collect();
        let mut filled = String::with_capacity(path.len());
        let mut rest = path;
        while let Some(start) = rest.find('{') {
            filled.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) => {
                    let hole = &after[..end];
                    if let Some(value) = params.get(hole) {
                        filled.push_str(&Self::param_string(value));
                        remaining.retain(|name, _| name.as_str() != hole);
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    filled.push_str(rest);
                    rest = "";
                }
            }
        }
        filled.push_str(rest);

        let query = remaining
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(name, value)| (name.clone(), Self::param_string(value)))
            .collect();
        (format!("{}{}", self.base_url.trim_end_matches('/'), filled), query)
    }
}

#[async_trait]
impl FootballApi for ApiFootballClient {
    async fn call(
        &self,
        endpoint_name: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<Value, ApiError> {
        let endpoint = self
            .knowledge_base
            .get(endpoint_name)
            .ok_or_else(|| ApiError::UnknownEndpoint(endpoint_name.to_string()))?;

        let (url, query) = self.build_url(&endpoint.path, params);
        tracing::debug!(endpoint = endpoint_name, %url, "calling upstream");

        let response = self
            .http_client
            .get(&url)
            .query(&query)
            .header("x-apisports-key", &self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout
                } else {
                    ApiError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Status { code: status.as_u16(), body });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ApiFootballClient {
        ApiFootballClient::new(
            "https://v3.football.api-sports.io/",
            "test-key",
            Arc::new(KnowledgeBase::new()),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_build_url_query_params() {
        let client = client();
        let params: BTreeMap<String, Value> = [
            ("league".to_string(), json!(61)),
            ("season".to_string(), json!(2026)),
            ("team".to_string(), Value::Null),
        ]
        .into();

        let (url, query) = client.build_url("/standings", &params);
        assert_eq!(url, "https://v3.football.api-sports.io/standings");
        assert_eq!(
            query,
            vec![("league".to_string(), "61".to_string()), ("season".to_string(), "2026".to_string())]
        );
    }

    #[test]
    fn test_build_url_fills_path_holes() {
        let client = client();
        let params: BTreeMap<String, Value> =
            [("id".to_string(), json!(12345)), ("timezone".to_string(), json!("Europe/Paris"))].into();

        let (url, query) = client.build_url("/fixtures/{id}", &params);
        assert_eq!(url, "https://v3.football.api-sports.io/fixtures/12345");
        assert_eq!(query, vec![("timezone".to_string(), "Europe/Paris".to_string())]);
    }
}
