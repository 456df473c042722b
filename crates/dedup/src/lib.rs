//! Deduplication engine: clusters near-identical tools from different
//! providers into a smaller unified surface.

use mcp_meta_similarity::{schema_similarity, string_similarity};
use serde::Serialize;
use serde_json::Value;

/// Threshold for the cheap name-only pre-grouping pass used on large inputs.
const LARGE_SET_THRESHOLD: usize = 100;
const NAME_PREGROUP_THRESHOLD: f64 = 0.6;
const DEFAULT_PLACEHOLDER_DESCRIPTION: &str = "No description available";

/// Tunable weights and thresholds for deduplication. Not hard-coded: tests
/// vary the weights to exercise the threshold boundary (scenario S5).
#[derive(Debug, Clone)]
pub struct DeduplicationConfig {
    pub enabled: bool,
    pub similarity_threshold: f64,
    pub auto_merge: bool,
    pub name_weight: f64,
    pub description_weight: f64,
    pub schema_weight: f64,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.8,
            auto_merge: true,
            name_weight: 0.40,
            description_weight: 0.35,
            schema_weight: 0.25,
        }
    }
}

/// A minimal tool description, independent of any particular MCP transport
/// type, so this crate has no dependency on `rmcp`.
#[derive(Debug, Clone)]
pub struct ToolSpecLite {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

/// One `(provider, tool)` pair fed into the clustering pass.
#[derive(Debug, Clone)]
pub struct DedupToolInput {
    pub provider_id: String,
    pub spec: ToolSpecLite,
}

/// Strategy that dominated a pairwise similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityStrategy {
    Name,
    Description,
    Schema,
    Hybrid,
}

/// Result of comparing two tools.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSimilarity {
    pub score: f64,
    pub reason: String,
    pub strategy: SimilarityStrategy,
}

/// A cluster of tools from (possibly) multiple providers, exposed as one
/// tool surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub members: Vec<MergedMember>,
    pub confidence: f64,
    pub primary_provider_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedMember {
    pub provider_id: String,
    pub tool_name: String,
}

/// Aggregate clustering statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupStats {
    pub total_input_tools: usize,
    pub merged_groups: usize,
    pub reduction_percentage: f64,
    pub avg_confidence: f64,
}

/// Pairwise similarity between two tools, per §4.1/§4.2.
#[must_use]
pub fn pair_similarity(a: &ToolSpecLite, b: &ToolSpecLite, config: &DeduplicationConfig) -> ToolSimilarity {
    let name_sim = string_similarity(&a.name, &b.name);
    let desc_sim = match (&a.description, &b.description) {
        (Some(da), Some(db)) => string_similarity(da, db),
        _ => 0.0,
    };
    let schema_sim = schema_similarity(a.input_schema.as_ref(), b.input_schema.as_ref());

    let score = config.name_weight * name_sim
        + config.description_weight * desc_sim
        + config.schema_weight * schema_sim;

    let mut reasons = Vec::new();
    if name_sim > 0.8 {
        reasons.push("similar names");
    }
    if desc_sim > 0.7 {
        reasons.push("similar descriptions");
    }
    if schema_sim > 0.8 {
        reasons.push("similar schemas");
    }
    let reason = if reasons.is_empty() {
        "no significant similarities".to_string()
    } else {
        reasons.join(", ")
    };

    let strategy = if name_sim > 0.9 && schema_sim > 0.8 {
        SimilarityStrategy::Name
    } else if desc_sim > 0.8 && schema_sim > 0.7 {
        SimilarityStrategy::Description
    } else if schema_sim > 0.9 {
        SimilarityStrategy::Schema
    } else {
        SimilarityStrategy::Hybrid
    };

    ToolSimilarity {
        score,
        reason,
        strategy,
    }
}

/// Cluster a flat list of `(provider, tool)` pairs into merged tools.
///
/// Uses the O(n²) greedy pass directly for inputs of 100 or fewer entries,
/// and a cheap name-based pre-grouping pass first for larger inputs (see
/// §4.2 for the accepted precision/recall trade-off of the large-set path).
#[must_use]
pub fn cluster_tools(
    inputs: Vec<DedupToolInput>,
    config: &DeduplicationConfig,
) -> (Vec<MergedTool>, DedupStats) {
    let total_input_tools = inputs.len();

    let groups: Vec<Vec<usize>> = if total_input_tools <= LARGE_SET_THRESHOLD {
        greedy_group(&inputs, 0..total_input_tools, config)
    } else {
        let pregroups = pregroup_by_name(&inputs);
        pregroups
            .into_iter()
            .flat_map(|indices| greedy_group(&inputs, indices.into_iter(), config))
            .collect()
    };

    let mut merged_tools = Vec::with_capacity(groups.len());
    for group in &groups {
        merged_tools.push(build_merged_tool(&inputs, group, config));
    }

    let merged_groups = groups.iter().filter(|g| g.len() > 1).count();
    let total_output = merged_tools.len();
    let reduction_percentage = if total_input_tools == 0 {
        0.0
    } else {
        (total_input_tools - total_output) as f64 / total_input_tools as f64 * 100.0
    };
    let avg_confidence = if merged_tools.is_empty() {
        0.0
    } else {
        merged_tools.iter().map(|m| m.confidence).sum::<f64>() / merged_tools.len() as f64
    };

    let stats = DedupStats {
        total_input_tools,
        merged_groups,
        reduction_percentage,
        avg_confidence,
    };

    (merged_tools, stats)
}

/// Greedy single-pass grouping over the given index range: for each
/// unprocessed index, open a new group and attach every later unprocessed
/// index scoring above the configured threshold.
fn greedy_group(
    inputs: &[DedupToolInput],
    indices: impl Iterator<Item = usize>,
    config: &DeduplicationConfig,
) -> Vec<Vec<usize>> {
    let indices: Vec<usize> = indices.collect();
    let mut processed = vec![false; inputs.len()];
    let mut groups = Vec::new();

    for (pos, &i) in indices.iter().enumerate() {
        if processed[i] {
            continue;
        }
        let mut group = vec![i];
        processed[i] = true;
        for &j in &indices[pos + 1..] {
            if processed[j] {
                continue;
            }
            let sim = pair_similarity(&inputs[i].spec, &inputs[j].spec, config);
            if sim.score >= config.similarity_threshold {
                group.push(j);
                processed[j] = true;
            }
        }
        groups.push(group);
    }

    groups
}

/// Cheap first pass for large inputs: bucket by name similarity alone.
fn pregroup_by_name(inputs: &[DedupToolInput]) -> Vec<Vec<usize>> {
    let mut buckets: Vec<Vec<usize>> = Vec::new();
    'outer: for i in 0..inputs.len() {
        for bucket in &mut buckets {
            let rep = bucket[0];
            if string_similarity(&inputs[rep].spec.name, &inputs[i].spec.name) >= NAME_PREGROUP_THRESHOLD {
                bucket.push(i);
                continue 'outer;
            }
        }
        buckets.push(vec![i]);
    }
    buckets
}

/// Like `Iterator::max_by_key`, but the *first* maximal element wins ties
/// (std's version keeps the last).
fn first_max_by_key<T, K: Ord>(iter: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Option<T> {
    iter.fold(None, |best: Option<(T, K)>, item| {
        let k = key(&item);
        match best {
            Some((b, bk)) if bk >= k => Some((b, bk)),
            _ => Some((item, k)),
        }
    })
    .map(|(item, _)| item)
}

fn build_merged_tool(
    inputs: &[DedupToolInput],
    group: &[usize],
    config: &DeduplicationConfig,
) -> MergedTool {
    let members: Vec<&DedupToolInput> = group.iter().map(|&i| &inputs[i]).collect();

    // Exposed name: most frequent member name, ties -> first encountered.
    let mut name_counts: Vec<(String, usize)> = Vec::new();
    for m in &members {
        match name_counts.iter_mut().find(|(n, _)| n == &m.spec.name) {
            Some((_, count)) => *count += 1,
            None => name_counts.push((m.spec.name.clone(), 1)),
        }
    }
    let name = first_max_by_key(name_counts.iter(), |entry| entry.1)
        .map(|(n, _)| n.clone())
        .unwrap_or_default();

    // Representative: longest non-empty description, ties -> first encountered.
    let representative = *first_max_by_key(members.iter(), |m| {
        m.spec.description.as_deref().unwrap_or_default().len()
    })
    .expect("group is non-empty");

    let description = members
        .iter()
        .filter_map(|m| m.spec.description.as_deref())
        .filter(|d| !d.is_empty())
        .fold(None::<&str>, |best, d| match best {
            Some(b) if b.len() >= d.len() => Some(b),
            _ => Some(d),
        })
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_PLACEHOLDER_DESCRIPTION.to_string());

    let input_schema = representative
        .spec
        .input_schema
        .clone()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    let confidence = if members.len() == 1 {
        1.0
    } else {
        let mut scores = Vec::new();
        for a in 0..members.len() {
            for b in (a + 1)..members.len() {
                scores.push(pair_similarity(&members[a].spec, &members[b].spec, config).score);
            }
        }
        scores.iter().sum::<f64>() / scores.len() as f64
    };

    MergedTool {
        name,
        description,
        input_schema,
        members: members
            .iter()
            .map(|m| MergedMember {
                provider_id: m.provider_id.clone(),
                tool_name: m.spec.name.clone(),
            })
            .collect(),
        confidence,
        primary_provider_id: representative.provider_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(provider: &str, name: &str, description: Option<&str>, schema: Value) -> DedupToolInput {
        DedupToolInput {
            provider_id: provider.to_string(),
            spec: ToolSpecLite {
                name: name.to_string(),
                description: description.map(str::to_string),
                input_schema: Some(schema),
            },
        }
    }

    #[test]
    fn singleton_has_full_confidence() {
        let inputs = vec![tool("a", "read_file", Some("reads"), json!({"type": "object"}))];
        let (merged, stats) = cluster_tools(inputs, &DeduplicationConfig::default());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].confidence, 1.0);
        assert_eq!(stats.merged_groups, 0);
    }

    #[test]
    fn scenario_s5_below_threshold_no_merge() {
        let inputs = vec![
            tool("A", "list_files", None, json!({"properties": {"path": {"type": "string"}}})),
            tool("B", "listFiles", None, json!({"properties": {"path": {"type": "string"}}})),
        ];
        let config = DeduplicationConfig::default();
        let (merged, _) = cluster_tools(inputs, &config);
        assert_eq!(merged.len(), 2, "expected no merge below default threshold");
    }

    #[test]
    fn scenario_s5_lower_threshold_merges() {
        let inputs = vec![
            tool("A", "list_files", None, json!({"properties": {"path": {"type": "string"}}})),
            tool("B", "listFiles", None, json!({"properties": {"path": {"type": "string"}}})),
        ];
        let mut config = DeduplicationConfig::default();
        config.similarity_threshold = 0.5;
        let (merged, _) = cluster_tools(inputs, &config);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "list_files");
    }

    #[test]
    fn invariant_primary_provider_is_a_member() {
        let inputs = vec![
            tool("A", "search", Some("short"), json!({"type": "object"})),
            tool("B", "search", Some("a much longer description here"), json!({"type": "object"})),
        ];
        let (merged, _) = cluster_tools(inputs, &DeduplicationConfig::default());
        assert_eq!(merged.len(), 1);
        let m = &merged[0];
        assert!(m.members.iter().any(|mm| mm.provider_id == m.primary_provider_id));
        assert_eq!(m.primary_provider_id, "B");
    }

    #[test]
    fn dedup_is_idempotent_on_singletons() {
        let inputs = vec![
            tool("A", "alpha", Some("alpha tool"), json!({"type": "object"})),
            tool("B", "beta", Some("beta tool"), json!({"type": "object"})),
        ];
        let config = DeduplicationConfig::default();
        let (merged_once, _) = cluster_tools(inputs, &config);
        let reinputs: Vec<DedupToolInput> = merged_once
            .iter()
            .map(|m| DedupToolInput {
                provider_id: m.primary_provider_id.clone(),
                spec: ToolSpecLite {
                    name: m.name.clone(),
                    description: Some(m.description.clone()),
                    input_schema: Some(m.input_schema.clone()),
                },
            })
            .collect();
        let (merged_twice, _) = cluster_tools(reinputs, &config);
        assert_eq!(merged_once.len(), merged_twice.len());
    }

    #[test]
    fn large_set_uses_pregrouping_path() {
        let mut inputs = Vec::new();
        for i in 0..150 {
            inputs.push(tool(
                &format!("p{i}"),
                &format!("unique_tool_{i}"),
                Some("distinct"),
                json!({"type": "object"}),
            ));
        }
        let (merged, stats) = cluster_tools(inputs, &DeduplicationConfig::default());
        assert_eq!(merged.len(), 150);
        assert_eq!(stats.total_input_tools, 150);
    }

    #[test]
    fn reason_lists_all_applicable_similarities() {
        let a = ToolSpecLite {
            name: "read_file".to_string(),
            description: Some("reads a file from disk".to_string()),
            input_schema: Some(json!({"properties": {"path": {"type": "string"}}})),
        };
        let b = ToolSpecLite {
            name: "read_file".to_string(),
            description: Some("reads a file from disk".to_string()),
            input_schema: Some(json!({"properties": {"path": {"type": "string"}}})),
        };
        let sim = pair_similarity(&a, &b, &DeduplicationConfig::default());
        assert!(sim.reason.contains("similar names"));
        assert!(sim.reason.contains("similar descriptions"));
        assert!(sim.reason.contains("similar schemas"));
    }
}
