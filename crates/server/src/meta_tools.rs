//! The eight built-in meta-tools: introspection and control operations the
//! aggregator exposes itself, never routed to a downstream provider.

use crate::aggregator::Aggregator;
use crate::error::{MetaServerError, Result};
use mcp_meta_dedup::DeduplicationConfig;
use mcp_meta_similarity::{schema_similarity, string_similarity};
use serde::Deserialize;
use serde_json::{Value, json};

pub const META_TOOL_NAMES: &[&str] = &[
    "discover_servers",
    "analyze_usage",
    "get_cache_stats",
    "suggest_tools",
    "batch_execute",
    "optimize_routing",
    "configure_deduplication",
    "analyze_tool_similarity",
];

#[must_use]
pub fn is_meta_tool(name: &str) -> bool {
    META_TOOL_NAMES.contains(&name)
}

/// JSON Schema for each meta-tool's input, all declaring
/// `additionalProperties: false`.
#[must_use]
pub fn input_schema(name: &str) -> Value {
    match name {
        "discover_servers" => json!({"type": "object", "properties": {}, "additionalProperties": false}),
        "analyze_usage" => json!({
            "type": "object",
            "properties": {
                "timeframe": {"type": "string", "enum": ["hour", "day", "week"]},
                "serverId": {"type": "string"},
            },
            "additionalProperties": false,
        }),
        "get_cache_stats" => json!({"type": "object", "properties": {}, "additionalProperties": false}),
        "suggest_tools" => json!({
            "type": "object",
            "properties": {
                "task": {"type": "string"},
                "context": {"type": "object"},
            },
            "required": ["task"],
            "additionalProperties": false,
        }),
        "batch_execute" => json!({
            "type": "object",
            "properties": {
                "operations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "tool": {"type": "string"},
                            "arguments": {"type": "object"},
                        },
                        "required": ["tool", "arguments"],
                    },
                },
                "concurrency": {"type": "integer", "minimum": 1, "maximum": 20},
            },
            "required": ["operations"],
            "additionalProperties": false,
        }),
        "optimize_routing" => json!({
            "type": "object",
            "properties": {"tool": {"type": "string"}},
            "additionalProperties": false,
        }),
        "configure_deduplication" => json!({
            "type": "object",
            "properties": {
                "enabled": {"type": "boolean"},
                "similarityThreshold": {"type": "number", "minimum": 0, "maximum": 1},
                "autoMerge": {"type": "boolean"},
                "getStats": {"type": "boolean"},
            },
            "additionalProperties": false,
        }),
        "analyze_tool_similarity" => json!({
            "type": "object",
            "properties": {
                "tool1": {"type": "string"},
                "tool2": {"type": "string"},
                "listSimilar": {"type": "boolean"},
                "toolName": {"type": "string"},
            },
            "additionalProperties": false,
        }),
        _ => json!({"type": "object", "additionalProperties": false}),
    }
}

#[must_use]
pub fn description(name: &str) -> &'static str {
    match name {
        "discover_servers" => "List every registered provider with its status, tool count, and metrics summary",
        "analyze_usage" => "Summarize call counts, cache stats, and per-provider metrics over a timeframe",
        "get_cache_stats" => "Return current result-cache statistics",
        "suggest_tools" => "Rank available tools by relevance to a described task",
        "batch_execute" => "Run a list of tool calls concurrently, in bounded waves",
        "optimize_routing" => "Flag (provider, tool) pairs with poor success rate or latency",
        "configure_deduplication" => "Adjust deduplication settings and optionally rebuild the tool inventory",
        "analyze_tool_similarity" => "Compare two tools, or list tools similar to one, by similarity score",
        _ => "",
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeUsageArgs {
    #[serde(default)]
    timeframe: Option<String>,
    #[serde(default, rename = "serverId")]
    server_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SuggestToolsArgs {
    task: String,
}

#[derive(Debug, Deserialize)]
struct BatchOperation {
    tool: String,
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct BatchExecuteArgs {
    operations: Vec<BatchOperation>,
    #[serde(default)]
    concurrency: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OptimizeRoutingArgs {
    #[serde(default)]
    tool: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigureDedupArgs {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default, rename = "similarityThreshold")]
    similarity_threshold: Option<f64>,
    #[serde(default, rename = "autoMerge")]
    auto_merge: Option<bool>,
    #[serde(default, rename = "getStats")]
    get_stats: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeSimilarityArgs {
    #[serde(default)]
    tool1: Option<String>,
    #[serde(default)]
    tool2: Option<String>,
    #[serde(default, rename = "listSimilar")]
    list_similar: Option<bool>,
    #[serde(default, rename = "toolName")]
    tool_name: Option<String>,
}

/// Dispatch one meta-tool call in-process. Meta-tools never touch the
/// cache or metrics stores and return a structured JSON result.
///
/// # Errors
///
/// Returns a human-readable error for unknown meta-tool names or malformed
/// arguments.
pub async fn call(aggregator: &Aggregator, name: &str, arguments: Value) -> Result<Value> {
    match name {
        "discover_servers" => Ok(discover_servers(aggregator)),
        "analyze_usage" => analyze_usage(aggregator, arguments),
        "get_cache_stats" => Ok(get_cache_stats(aggregator)),
        "suggest_tools" => suggest_tools(aggregator, arguments),
        "batch_execute" => batch_execute(aggregator, arguments).await,
        "optimize_routing" => optimize_routing(aggregator, arguments),
        "configure_deduplication" => configure_deduplication(aggregator, arguments),
        "analyze_tool_similarity" => analyze_tool_similarity(aggregator, arguments),
        other => Err(MetaServerError::MetaToolUsage(format!("unknown meta-tool '{other}'"))),
    }
}

fn discover_servers(aggregator: &Aggregator) -> Value {
    let servers: Vec<Value> = aggregator
        .registry()
        .snapshot()
        .into_iter()
        .map(|p| {
            let metrics_summary: Vec<Value> = aggregator
                .metrics()
                .for_provider(&p.id)
                .into_iter()
                .map(|(tool, m)| {
                    json!({
                        "tool": tool,
                        "totalCalls": m.total_calls,
                        "successRate": m.success_rate,
                    })
                })
                .collect();
            json!({
                "id": p.id,
                "name": p.name,
                "description": p.description,
                "status": format!("{:?}", p.status).to_lowercase(),
                "toolCount": p.tool_count,
                "command": p.command,
                "metrics": metrics_summary,
            })
        })
        .collect();
    json!({ "servers": servers })
}

fn analyze_usage(aggregator: &Aggregator, arguments: Value) -> Result<Value> {
    let args: AnalyzeUsageArgs = parse_args(arguments)?;
    let timeframe = args.timeframe.unwrap_or_else(|| "day".to_string());
    let cache_stats = aggregator.cache().get_stats();

    if let Some(server_id) = args.server_id {
        let metrics: Vec<Value> = aggregator
            .metrics()
            .for_provider(&server_id)
            .into_iter()
            .map(|(tool, m)| {
                json!({
                    "tool": tool,
                    "totalCalls": m.total_calls,
                    "failureCount": m.failure_count,
                    "successRate": m.success_rate,
                    "avgResponseTimeMillis": m.avg_response_time_millis,
                    "lastUsed": m.last_used,
                })
            })
            .collect();
        return Ok(json!({
            "timeframe": timeframe,
            "serverId": server_id,
            "metrics": metrics,
            "cache": cache_stats,
        }));
    }

    let all = aggregator.metrics().all();

    let mut by_provider: std::collections::BTreeMap<String, Vec<_>> = std::collections::BTreeMap::new();
    for ((provider_id, tool), m) in &all {
        by_provider.entry(provider_id.clone()).or_default().push((tool.clone(), m.clone()));
    }

    let providers: Vec<Value> = by_provider
        .into_iter()
        .map(|(provider_id, entries)| {
            let tracked_tools = entries.len();
            let total_calls: u64 = entries.iter().map(|(_, m)| m.total_calls).sum();
            let avg_success_rate =
                entries.iter().map(|(_, m)| m.success_rate).sum::<f64>() / tracked_tools as f64;
            let avg_response_time_millis =
                entries.iter().map(|(_, m)| m.avg_response_time_millis).sum::<f64>() / tracked_tools as f64;
            json!({
                "providerId": provider_id,
                "trackedTools": tracked_tools,
                "totalCalls": total_calls,
                "avgSuccessRate": avg_success_rate,
                "avgResponseTimeMillis": avg_response_time_millis,
            })
        })
        .collect();

    let total_calls: u64 = all.iter().map(|(_, m)| m.total_calls).sum();
    let avg_success_rate = if all.is_empty() {
        1.0
    } else {
        all.iter().map(|(_, m)| m.success_rate).sum::<f64>() / all.len() as f64
    };
    Ok(json!({
        "timeframe": timeframe,
        "overview": {
            "trackedPairs": all.len(),
            "totalCalls": total_calls,
            "avgSuccessRate": avg_success_rate,
            "providers": providers,
        },
        "cache": cache_stats,
    }))
}

fn get_cache_stats(aggregator: &Aggregator) -> Value {
    serde_json::to_value(aggregator.cache().get_stats()).unwrap_or(Value::Null)
}

/// `score = 0`; `+0.5` if one qualified name contains the other (or
/// vice versa); `+0.3 * |wordsT ∩ wordsD| / |wordsT|`; if metrics exist,
/// `+0.2*successRate + 0.1*responseScore`. Clipped to `[0, 1]`.
fn relevance_score(task: &str, qualified_name: &str, description: &str, metrics: Option<(f64, f64)>) -> f64 {
    let t = task.to_lowercase();
    let n = qualified_name.to_lowercase();
    let d = description.to_lowercase();

    let mut score = 0.0;
    if n.contains(&t) || t.contains(&n) {
        score += 0.5;
    }

    let words_t: std::collections::HashSet<&str> = t.split_whitespace().collect();
    let words_d: std::collections::HashSet<&str> = d.split_whitespace().collect();
    if !words_t.is_empty() {
        let overlap = words_t.intersection(&words_d).count();
        score += 0.3 * overlap as f64 / words_t.len() as f64;
    }

    if let Some((success_rate, response_score)) = metrics {
        score += 0.2 * success_rate + 0.1 * response_score;
    }

    score.min(1.0)
}

fn suggest_tools(aggregator: &Aggregator, arguments: Value) -> Result<Value> {
    let args: SuggestToolsArgs = parse_args(arguments)?;

    let mut scored: Vec<(f64, Value)> = aggregator
        .registry()
        .connected_tools()
        .into_iter()
        .flat_map(|(provider_id, tools)| {
            tools.into_iter().map(move |spec| (provider_id.clone(), spec))
        })
        .map(|(provider_id, spec)| {
            let qualified_name = format!("{provider_id}:{}", spec.name);
            let description = spec.description.clone().unwrap_or_default();
            let m = aggregator.metrics().get(&provider_id, &spec.name);
            let metrics = if m.total_calls > 0 {
                let response_score = (1.0 - m.avg_response_time_millis / 10_000.0).max(0.0);
                Some((m.success_rate, response_score))
            } else {
                None
            };
            let score = relevance_score(&args.task, &qualified_name, &description, metrics);
            (
                score,
                json!({
                    "qualifiedName": qualified_name,
                    "providerId": provider_id,
                    "name": spec.name,
                    "description": description,
                    "relevanceScore": score,
                }),
            )
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let top: Vec<Value> = scored.into_iter().take(10).map(|(_, v)| v).collect();
    Ok(json!({ "suggestions": top }))
}

async fn batch_execute(aggregator: &Aggregator, arguments: Value) -> Result<Value> {
    let args: BatchExecuteArgs = parse_args(arguments)?;
    let concurrency = args.concurrency.unwrap_or(5).clamp(1, 20);

    let mut results = Vec::with_capacity(args.operations.len());
    for wave in args.operations.chunks(concurrency) {
        let wave_futures = wave.iter().map(|op| async move {
            match aggregator.dispatch(&op.tool, op.arguments.clone()).await {
                Ok(value) => json!({"tool": op.tool, "status": "ok", "result": value}),
                Err(e) => json!({"tool": op.tool, "status": "error", "error": e.to_string()}),
            }
        });
        let wave_results = futures::future::join_all(wave_futures).await;
        results.extend(wave_results);
    }

    Ok(json!({ "results": results }))
}

fn optimize_routing(aggregator: &Aggregator, arguments: Value) -> Result<Value> {
    let _args: OptimizeRoutingArgs = parse_args(arguments)?;
    let warnings: Vec<Value> = aggregator
        .metrics()
        .all()
        .into_iter()
        .filter_map(|((provider_id, tool), m)| {
            let mut reasons = Vec::new();
            if m.success_rate < 0.8 {
                reasons.push("low success rate".to_string());
            }
            if m.avg_response_time_millis > 5000.0 {
                reasons.push("high average response time".to_string());
            }
            if reasons.is_empty() {
                None
            } else {
                Some(json!({
                    "providerId": provider_id,
                    "tool": tool,
                    "successRate": m.success_rate,
                    "avgResponseTimeMillis": m.avg_response_time_millis,
                    "reasons": reasons,
                }))
            }
        })
        .collect();

    Ok(json!({
        "warnings": warnings,
        "cache": aggregator.cache().get_stats(),
    }))
}

fn configure_deduplication(aggregator: &Aggregator, arguments: Value) -> Result<Value> {
    let args: ConfigureDedupArgs = parse_args(arguments)?;
    let mut config = aggregator.dedup_config();

    if let Some(enabled) = args.enabled {
        config.enabled = enabled;
    }
    if let Some(threshold) = args.similarity_threshold {
        config.similarity_threshold = threshold;
    }
    if let Some(auto_merge) = args.auto_merge {
        config.auto_merge = auto_merge;
    }

    aggregator.set_dedup_config(config.clone());

    let mut response = json!({
        "enabled": config.enabled,
        "similarityThreshold": config.similarity_threshold,
        "autoMerge": config.auto_merge,
    });

    if args.get_stats.unwrap_or(false) {
        let stats = aggregator.last_dedup_stats();
        let namespaced_count = aggregator.namespaced_tools().len();
        response["dedupStats"] = serde_json::to_value(stats).unwrap_or(Value::Null);
        response["namespacedToolCount"] = json!(namespaced_count);
    }

    Ok(response)
}

fn analyze_tool_similarity(aggregator: &Aggregator, arguments: Value) -> Result<Value> {
    let args: AnalyzeSimilarityArgs = parse_args(arguments)?;

    if let (Some(list_similar), Some(tool_name)) = (args.list_similar, args.tool_name.clone()) {
        if list_similar {
            let tools = aggregator.namespaced_tools();
            let Some(target) = tools.iter().find(|t| t.qualified_name == tool_name || t.spec.name == tool_name)
            else {
                return Err(MetaServerError::MetaToolUsage(format!("unknown tool '{tool_name}'")));
            };

            let mut similar: Vec<Value> = tools
                .iter()
                .filter(|t| t.qualified_name != target.qualified_name)
                .filter_map(|t| {
                    let name_sim = string_similarity(&target.spec.name, &t.spec.name);
                    let schema_sim =
                        schema_similarity(Some(&target.spec.input_schema), Some(&t.spec.input_schema));
                    let score = 0.5 * name_sim + 0.5 * schema_sim;
                    (score > 0.5).then(|| {
                        json!({
                            "qualifiedName": t.qualified_name,
                            "score": score,
                        })
                    })
                })
                .collect();
            similar.sort_by(|a, b| {
                let sa = a["score"].as_f64().unwrap_or(0.0);
                let sb = b["score"].as_f64().unwrap_or(0.0);
                sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
            });
            return Ok(json!({ "similar": similar }));
        }
    }

    match (args.tool1, args.tool2) {
        (Some(t1), Some(t2)) => {
            let tools = aggregator.namespaced_tools();
            let a = tools
                .iter()
                .find(|t| t.qualified_name == t1 || t.spec.name == t1)
                .ok_or_else(|| MetaServerError::MetaToolUsage(format!("unknown tool '{t1}'")))?;
            let b = tools
                .iter()
                .find(|t| t.qualified_name == t2 || t.spec.name == t2)
                .ok_or_else(|| MetaServerError::MetaToolUsage(format!("unknown tool '{t2}'")))?;
            let name_sim = string_similarity(&a.spec.name, &b.spec.name);
            let schema_sim = schema_similarity(Some(&a.spec.input_schema), Some(&b.spec.input_schema));
            Ok(json!({
                "tool1": a.qualified_name,
                "tool2": b.qualified_name,
                "nameSimilarity": name_sim,
                "schemaSimilarity": schema_sim,
            }))
        }
        _ => Err(MetaServerError::MetaToolUsage(
            "either (tool1, tool2) or (listSimilar, toolName) must be provided".to_string(),
        )),
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|e| MetaServerError::MetaToolUsage(format!("invalid arguments: {e}")))
}

#[must_use]
pub fn default_dedup_config() -> DeduplicationConfig {
    DeduplicationConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_score_prefix_match() {
        let score = relevance_score("read file", "p:read_file", "reads a file", None);
        assert!(score > 0.0);
    }

    #[test]
    fn relevance_score_clips_to_one() {
        let score = relevance_score("read", "p:read", "read read read", Some((1.0, 1.0)));
        assert!(score <= 1.0);
    }

    #[test]
    fn is_meta_tool_matches_all_eight() {
        assert_eq!(META_TOOL_NAMES.len(), 8);
        for n in META_TOOL_NAMES {
            assert!(is_meta_tool(n));
        }
        assert!(!is_meta_tool("not_a_meta_tool"));
    }

    #[test]
    fn analyze_usage_overview_breaks_down_by_provider() {
        let aggregator = Aggregator::new(crate::registry::ProviderRegistry::new(), DeduplicationConfig::default());
        aggregator.metrics().record("a", "read", true, 100.0);
        aggregator.metrics().record("a", "write", true, 100.0);
        aggregator.metrics().record("b", "read", false, 100.0);

        let result = analyze_usage(&aggregator, json!({})).expect("overview succeeds");
        let providers = result["overview"]["providers"].as_array().expect("providers array");
        assert_eq!(providers.len(), 2);

        let a = providers.iter().find(|p| p["providerId"] == "a").expect("provider a present");
        assert_eq!(a["trackedTools"], 2);
        assert_eq!(a["totalCalls"], 2);

        let b = providers.iter().find(|p| p["providerId"] == "b").expect("provider b present");
        assert_eq!(b["totalCalls"], 1);
        assert_eq!(b["avgSuccessRate"], 0.0);
    }
}
