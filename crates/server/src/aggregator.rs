//! Consolidates tool listings across providers, namespaces them, optionally
//! deduplicates, routes invocations, and keeps the cache/metrics stores in
//! sync.

use crate::error::{MetaServerError, Result};
use crate::provider::ToolSpec;
use crate::registry::ProviderRegistry;
use crate::router::{self, RoutingCandidate, RoutingDecision};
use mcp_meta_cache::ResultCache;
use mcp_meta_dedup::{DedupStats, DedupToolInput, DeduplicationConfig, MergedTool, ToolSpecLite, cluster_tools};
use mcp_meta_metrics::MetricsStore;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;

/// A tool qualified by its provider id: `"<providerId>:<toolName>"`.
#[derive(Debug, Clone)]
pub struct NamespacedTool {
    pub qualified_name: String,
    pub provider_id: String,
    pub spec: ToolSpec,
}

impl NamespacedTool {
    fn qualify(provider_id: &str, tool_name: &str) -> String {
        format!("{provider_id}:{tool_name}")
    }

    /// Split a `"<providerId>:<toolName>"` string. Provider ids never
    /// contain `:`, so this splits on the first occurrence.
    #[must_use]
    pub fn parse_qualified(qualified: &str) -> Option<(&str, &str)> {
        qualified.split_once(':')
    }
}

/// Either a single namespaced tool or a merged cluster, as resolved for a
/// single call.
enum ResolvedTarget {
    Namespaced { provider_id: String, tool_name: String },
    Merged(MergedTool),
}

/// Consolidated tool inventory plus the four hot structures that must stay
/// linearizable under concurrent access: the deduplication config/merged map
/// here, metrics and cache as standalone crates threaded through.
pub struct Aggregator {
    registry: ProviderRegistry,
    metrics: MetricsStore,
    cache: ResultCache,
    dedup_config: RwLock<DeduplicationConfig>,
    namespaced: RwLock<HashMap<String, NamespacedTool>>,
    merged: RwLock<Vec<MergedTool>>,
    last_dedup_stats: RwLock<Option<DedupStats>>,
}

impl Aggregator {
    #[must_use]
    pub fn new(registry: ProviderRegistry, dedup_config: DeduplicationConfig) -> Self {
        let aggregator = Self {
            registry,
            metrics: MetricsStore::new(),
            cache: ResultCache::default(),
            dedup_config: RwLock::new(dedup_config),
            namespaced: RwLock::new(HashMap::new()),
            merged: RwLock::new(Vec::new()),
            last_dedup_stats: RwLock::new(None),
        };
        aggregator.rebuild();
        aggregator
    }

    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    #[must_use]
    pub fn metrics(&self) -> &MetricsStore {
        &self.metrics
    }

    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    #[must_use]
    pub fn dedup_config(&self) -> DeduplicationConfig {
        self.dedup_config.read().clone()
    }

    pub fn set_dedup_config(&self, config: DeduplicationConfig) {
        *self.dedup_config.write() = config;
        self.rebuild();
    }

    #[must_use]
    pub fn last_dedup_stats(&self) -> Option<DedupStats> {
        self.last_dedup_stats.read().clone()
    }

    /// Take a fresh snapshot of every connected provider's tool list,
    /// rebuild the namespaced inventory, and (if enabled) recompute the
    /// merged map. Called on startup and whenever dedup config changes.
    pub fn rebuild(&self) {
        let provider_tools = self.registry.connected_tools();

        let mut namespaced = HashMap::new();
        let mut dedup_inputs = Vec::new();
        for (provider_id, tools) in &provider_tools {
            for spec in tools {
                let qualified_name = NamespacedTool::qualify(provider_id, &spec.name);
                namespaced.insert(
                    qualified_name.clone(),
                    NamespacedTool {
                        qualified_name,
                        provider_id: provider_id.clone(),
                        spec: spec.clone(),
                    },
                );
                dedup_inputs.push(DedupToolInput {
                    provider_id: provider_id.clone(),
                    spec: ToolSpecLite {
                        name: spec.name.clone(),
                        description: spec.description.clone(),
                        input_schema: Some(spec.input_schema.clone()),
                    },
                });
            }
        }
        *self.namespaced.write() = namespaced;

        let config = self.dedup_config.read().clone();
        if config.enabled {
            let (merged, stats) = cluster_tools(dedup_inputs, &config);
            *self.merged.write() = merged;
            *self.last_dedup_stats.write() = Some(stats);
        } else {
            self.merged.write().clear();
            *self.last_dedup_stats.write() = None;
        }
    }

    /// Every namespaced tool, regardless of dedup state. Used by
    /// `suggest_tools` and `analyze_tool_similarity`.
    #[must_use]
    pub fn namespaced_tools(&self) -> Vec<NamespacedTool> {
        self.namespaced.read().values().cloned().collect()
    }

    /// Tools exposed to the upstream client: merged tools if deduplication
    /// is enabled and produced at least one cluster, otherwise every
    /// namespaced tool.
    #[must_use]
    pub fn exposed_tools(&self) -> ExposedTools {
        let merged = self.merged.read();
        if self.dedup_config.read().enabled && !merged.is_empty() {
            ExposedTools::Merged(merged.clone())
        } else {
            drop(merged);
            ExposedTools::Namespaced(self.namespaced_tools())
        }
    }

    fn resolve(&self, name: &str) -> Option<ResolvedTarget> {
        if let Some(merged) = self.merged.read().iter().find(|m| m.name == name) {
            return Some(ResolvedTarget::Merged(merged.clone()));
        }
        if let Some((provider_id, tool_name)) = NamespacedTool::parse_qualified(name) {
            return Some(ResolvedTarget::Namespaced {
                provider_id: provider_id.to_string(),
                tool_name: tool_name.to_string(),
            });
        }
        None
    }

    fn routing_decision(&self, target: &ResolvedTarget) -> Option<RoutingDecision> {
        match target {
            ResolvedTarget::Namespaced { provider_id, .. } => {
                router::route_namespaced(provider_id, self.registry.is_connected(provider_id))
            }
            ResolvedTarget::Merged(merged) => {
                let candidates: Vec<RoutingCandidate> = merged
                    .members
                    .iter()
                    .filter(|m| self.registry.is_connected(&m.provider_id))
                    .map(|m| RoutingCandidate {
                        provider_id: m.provider_id.clone(),
                        tool_name: m.tool_name.clone(),
                    })
                    .collect();
                router::route_merged(&candidates, &self.metrics)
            }
        }
    }

    fn tool_name_for(target: &ResolvedTarget, provider_id: &str) -> String {
        match target {
            ResolvedTarget::Namespaced { tool_name, .. } => tool_name.clone(),
            ResolvedTarget::Merged(merged) => merged
                .members
                .iter()
                .find(|m| m.provider_id == provider_id)
                .map(|m| m.tool_name.clone())
                .unwrap_or_else(|| merged.name.clone()),
        }
    }

    /// Dispatch a call to `name` with `arguments`, following
    /// `Resolve -> CacheProbe -> {Hit|Miss -> Attempt_k -> ...}`.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` doesn't resolve to any known tool, no
    /// candidate provider is connected, or every candidate's invocation
    /// fails (the error carries the last candidate's underlying cause).
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value> {
        let target = self
            .resolve(name)
            .ok_or_else(|| MetaServerError::ToolInvocation(format!("unknown tool '{name}'")))?;
        let decision = self.routing_decision(&target).ok_or_else(|| {
            MetaServerError::ProviderUnavailable(format!("no connected provider available for '{name}'"))
        })?;

        let primary_tool_name = Self::tool_name_for(&target, &decision.primary);
        let cache_key = cache_key(&decision.primary, &primary_tool_name, &arguments);
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached);
        }

        let mut candidates = vec![decision.primary.clone()];
        candidates.extend(decision.fallbacks.iter().cloned());

        let mut last_error = None;
        for provider_id in candidates {
            let tool_name = Self::tool_name_for(&target, &provider_id);
            let start = Instant::now();
            match self.registry.call_tool(&provider_id, &tool_name, arguments.clone()).await {
                Ok(result) => {
                    let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                    self.metrics.record(&provider_id, &tool_name, true, elapsed);
                    let value = result_to_value(&result);
                    let key = cache_key(&provider_id, &tool_name, &arguments);
                    self.cache.set(key, &tool_name, &arguments, value.clone(), None);
                    return Ok(value);
                }
                Err(e) => {
                    let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                    self.metrics.record(&provider_id, &tool_name, false, elapsed);
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(MetaServerError::ToolInvocation(
            last_error.unwrap_or_else(|| format!("all candidates failed for '{name}'")),
        ))
    }

    /// Shut down every downstream session.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

/// What the upstream client sees in a tool listing (alongside the fixed
/// meta-tools).
pub enum ExposedTools {
    Merged(Vec<MergedTool>),
    Namespaced(Vec<NamespacedTool>),
}

/// Extract a JSON value from a `CallToolResult`: the structured content if
/// present, otherwise the concatenated text content.
fn result_to_value(result: &rmcp::model::CallToolResult) -> Value {
    if let Some(structured) = &result.structured_content {
        return structured.clone();
    }
    let text: String = result
        .content
        .iter()
        .filter_map(|c| c.as_text().map(|t| t.text.clone()))
        .collect::<Vec<_>>()
        .join("\n");
    Value::String(text)
}

/// `"<providerId>:<toolName>:<canonical-json(arguments)>"`.
#[must_use]
pub fn cache_key(provider_id: &str, tool_name: &str, arguments: &Value) -> String {
    let canonical = canonicalize_json(arguments);
    format!("{provider_id}:{tool_name}:{canonical}")
}

/// Deterministic JSON rendering: object keys sorted lexicographically at
/// every level. `serde_json`'s default `Display` already emits the
/// shortest round-trippable number form and minimally-escaped strings, so
/// the only thing left to normalize is key order.
#[must_use]
pub fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                if let Some(v) = map.get(&k) {
                    out.insert(k, canonicalize_json(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}
