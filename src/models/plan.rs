//! Execution Plan Models
//!
//! The planner's output: a DAG of endpoint calls whose parameters are
//! either literal values or `<from_X>` references resolved by the
//! orchestrator at level boundaries.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Errors raised while building or ordering a plan.
///
/// These indicate catalog inconsistency, not upstream trouble; the
/// pipeline surfaces them as a failed bundle with no calls executed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanningError {
    #[error("unknown endpoint referenced: {0}")]
    UnknownEndpoint(String),

    #[error("call {call} depends on unknown call {dependency}")]
    UnknownDependency { call: String, dependency: String },

    #[error("cannot build plan: {0}")]
    MissingEntity(String),

    #[error("dependency cycle involving {0}")]
    DependencyCycle(String),
}

// ============================================================================
// Parameter Values
// ============================================================================

/// A call parameter: either a concrete value or a reference to data
/// produced by an earlier call (or endpoint) in the same plan.
///
/// References serialize as the placeholder string `<from_{source}>` so a
/// plan dumped for introspection reads the same as the wire form.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Literal(Value),
    Reference(String),
}

impl ParamValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn reference(source: impl Into<String>) -> Self {
        Self::Reference(source.into())
    }

    pub fn as_reference(&self) -> Option<&str> {
        match self {
            Self::Reference(source) => Some(source.as_str()),
            Self::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Reference(_) => None,
        }
    }

    /// Sources this value references: the reference target itself, or
    /// any `<from_X>` placeholders embedded in a literal string (the
    /// form a combined value like `h2h = "<from_call_0>-<from_call_1>"`
    /// takes).
    pub fn referenced_sources(&self) -> Vec<String> {
        match self {
            Self::Reference(source) => vec![source.clone()],
            Self::Literal(Value::String(s)) => embedded_placeholders(s),
            Self::Literal(_) => vec![],
        }
    }

    /// Parses `<from_X>` strings back into references.
    pub fn from_wire(value: Value) -> Self {
        if let Value::String(s) = &value
            && let Some(source) = s.strip_prefix("<from_").and_then(|r| r.strip_suffix('>'))
            && !source.is_empty()
        {
            return Self::Reference(source.to_string());
        }
        Self::Literal(value)
    }
}

/// Extracts every `<from_X>` source named inside a string.
pub fn embedded_placeholders(text: &str) -> Vec<String> {
    let mut sources = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("<from_") {
        let after = &rest[start + "<from_".len()..];
        match after.find('>') {
            Some(end) if end > 0 => {
                sources.push(after[..end].to_string());
                rest = &after[end + 1..];
            }
            _ => break,
        }
    }
    sources
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Literal(value) => value.serialize(serializer),
            Self::Reference(source) => format!("<from_{source}>").serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_wire(value))
    }
}

// ============================================================================
// Endpoint Calls
// ============================================================================

/// One planned upstream call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointCall {
    /// Stable id in topological order: `call_0`, `call_1`, ...
    pub call_id: String,
    pub endpoint_name: String,
    pub params: BTreeMap<String, ParamValue>,
    /// Call ids that must complete before this call can be dispatched
    pub depends_on: BTreeSet<String>,
}

impl EndpointCall {
    pub fn new(call_id: impl Into<String>, endpoint_name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            endpoint_name: endpoint_name.into(),
            params: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        for source in value.referenced_sources() {
            if source.starts_with("call_") {
                self.depends_on.insert(source);
            }
        }
        self.params.insert(name.into(), value);
        self
    }
}

// ============================================================================
// Execution Plan
// ============================================================================

/// A cache entry the planner found already satisfied; the orchestrator
/// surfaces it as a `from_cache` result without reissuing the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresatisfiedEntry {
    pub endpoint_name: String,
    pub params: BTreeMap<String, Value>,
    pub data: Value,
}

/// Dependency-ordered sequence of calls plus data already satisfied
/// from cache at planning time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub calls: Vec<EndpointCall>,
    #[serde(default)]
    pub presatisfied: Vec<PresatisfiedEntry>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.len()
    }

    /// Groups calls by longest-path depth in the dependency DAG.
    ///
    /// Every call in level `k` has all of its dependencies in levels
    /// `0..k`, so each level can be dispatched concurrently once the
    /// previous one has drained. Returns an error on unknown
    /// dependencies or cycles; the concatenation of the returned groups
    /// is a permutation of `calls`.
    pub fn levels(&self) -> Result<Vec<Vec<EndpointCall>>, PlanningError> {
        if self.calls.is_empty() {
            return Ok(vec![]);
        }

        let index: HashMap<&str, usize> = self
            .calls
            .iter()
            .enumerate()
            .map(|(i, c)| (c.call_id.as_str(), i))
            .collect();

        // Kahn's algorithm, tracking longest-path depth per call.
        let mut indegree = vec![0usize; self.calls.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.calls.len()];
        for (i, call) in self.calls.iter().enumerate() {
            for dep in &call.depends_on {
                let Some(&j) = index.get(dep.as_str()) else {
                    return Err(PlanningError::UnknownDependency {
                        call: call.call_id.clone(),
                        dependency: dep.clone(),
                    });
                };
                indegree[i] += 1;
                dependents[j].push(i);
            }
        }

        let mut depth = vec![0usize; self.calls.len()];
        let mut queue: VecDeque<usize> = (0..self.calls.len()).filter(|&i| indegree[i] == 0).collect();
        let mut processed = 0usize;

        while let Some(i) = queue.pop_front() {
            processed += 1;
            for &next in &dependents[i] {
                depth[next] = depth[next].max(depth[i] + 1);
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if processed < self.calls.len() {
            let stuck = self
                .calls
                .iter()
                .enumerate()
                .find(|(i, _)| indegree[*i] > 0)
                .map(|(_, c)| c.call_id.clone())
                .unwrap_or_default();
            return Err(PlanningError::DependencyCycle(stuck));
        }

        let max_depth = depth.iter().copied().max().unwrap_or(0);
        let mut levels: Vec<Vec<EndpointCall>> = vec![Vec::new(); max_depth + 1];
        for (i, call) in self.calls.iter().enumerate() {
            levels[depth[i]].push(call.clone());
        }
        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(calls: Vec<EndpointCall>) -> ExecutionPlan {
        ExecutionPlan { calls, presatisfied: vec![] }
    }

    #[test]
    fn test_param_value_wire_form() {
        let reference = ParamValue::reference("call_0");
        assert_eq!(serde_json::to_value(&reference).unwrap(), json!("<from_call_0>"));

        let parsed = ParamValue::from_wire(json!("<from_team_search>"));
        assert_eq!(parsed, ParamValue::Reference("team_search".to_string()));

        let literal = ParamValue::from_wire(json!("2026-08-01"));
        assert_eq!(literal, ParamValue::Literal(json!("2026-08-01")));
    }

    #[test]
    fn test_reference_param_registers_dependency() {
        let call = EndpointCall::new("call_2", "fixtures_by_date")
            .with_param("team", ParamValue::reference("call_0"))
            .with_param("date", ParamValue::literal("2026-08-01"));

        assert!(call.depends_on.contains("call_0"));
        assert_eq!(call.depends_on.len(), 1);
    }

    #[test]
    fn test_embedded_placeholders_register_dependencies() {
        let call = EndpointCall::new("call_2", "head_to_head")
            .with_param("h2h", ParamValue::literal("<from_call_0>-<from_call_1>"));

        assert!(call.depends_on.contains("call_0"));
        assert!(call.depends_on.contains("call_1"));
        assert_eq!(
            embedded_placeholders("<from_call_0>-<from_call_1>"),
            vec!["call_0".to_string(), "call_1".to_string()]
        );
        assert!(embedded_placeholders("85-80").is_empty());
    }

    #[test]
    fn test_levels_partition_by_longest_path() {
        let calls = vec![
            EndpointCall::new("call_0", "team_search"),
            EndpointCall::new("call_1", "team_search"),
            EndpointCall::new("call_2", "fixtures_by_date")
                .with_param("home", ParamValue::reference("call_0"))
                .with_param("away", ParamValue::reference("call_1")),
            EndpointCall::new("call_3", "fixture_details")
                .with_param("id", ParamValue::reference("call_2")),
        ];
        let plan = plan(calls);

        let levels = plan.levels().unwrap();
        assert_eq!(levels.len(), 3);
        let ids: Vec<Vec<&str>> = levels
            .iter()
            .map(|level| level.iter().map(|c| c.call_id.as_str()).collect())
            .collect();
        assert_eq!(ids[0], vec!["call_0", "call_1"]);
        assert_eq!(ids[1], vec!["call_2"]);
        assert_eq!(ids[2], vec!["call_3"]);

        let total: usize = levels.iter().map(Vec::len).sum();
        assert_eq!(total, plan.total_calls());
    }

    #[test]
    fn test_levels_detects_cycle() {
        let mut a = EndpointCall::new("call_0", "a");
        a.depends_on.insert("call_1".to_string());
        let mut b = EndpointCall::new("call_1", "b");
        b.depends_on.insert("call_0".to_string());

        let err = plan(vec![a, b]).levels().unwrap_err();
        assert!(matches!(err, PlanningError::DependencyCycle(_)));
    }

    #[test]
    fn test_levels_rejects_unknown_dependency() {
        let mut call = EndpointCall::new("call_0", "a");
        call.depends_on.insert("call_9".to_string());

        let err = plan(vec![call]).levels().unwrap_err();
        assert!(matches!(err, PlanningError::UnknownDependency { .. }));
    }
}
