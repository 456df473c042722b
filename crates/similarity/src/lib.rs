//! String and JSON-schema similarity kernels.
//!
//! Used by `mcp-meta-dedup` to score how alike two tools are across
//! providers, and by the meta-tool surface for tool-name typo suggestions.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Jaro–Winkler similarity on lowercased inputs, in `[0, 1]`.
///
/// `sim("", "") == 1.0`, `sim(a, "") == 0.0` for non-empty `a`, and the
/// metric is symmetric: `sim(a, b) == sim(b, a)`.
#[must_use]
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    strsim::jaro_winkler(&a, &b).min(1.0)
}

/// Structural similarity between two JSON Schema objects, in `[0, 1]`.
///
/// A missing schema on either side scores `0`. Deep-equal schemas
/// short-circuit to `1`. Otherwise the score blends property-set overlap
/// (70%) with `required`-array overlap (30%); see §4.1 for the exact
/// weighting.
#[must_use]
pub fn schema_similarity(a: Option<&Value>, b: Option<&Value>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };

    if a == b {
        return 1.0;
    }

    let prop_sim = property_similarity(a, b);
    let req_sim = required_similarity(a, b);
    0.7 * prop_sim + 0.3 * req_sim
}

/// `(name, type)` pairs extracted from a schema's `properties`. A property
/// with no `type` key is treated as type `"unknown"`.
fn property_pairs(schema: &Value) -> HashSet<(String, String)> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, spec)| {
                    let ty = spec
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string();
                    (name.clone(), ty)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn property_similarity(a: &Value, b: &Value) -> f64 {
    let pa = property_pairs(a);
    let pb = property_pairs(b);
    if pa.is_empty() && pb.is_empty() {
        return 1.0;
    }
    let common = pa.intersection(&pb).count();
    2.0 * common as f64 / (pa.len() + pb.len()) as f64
}

fn required_set(schema: &Value) -> HashSet<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn required_similarity(a: &Value, b: &Value) -> f64 {
    let ra = required_set(a);
    let rb = required_set(b);
    if ra.is_empty() && rb.is_empty() {
        return 1.0;
    }
    let common = ra.intersection(&rb).count();
    2.0 * common as f64 / (ra.len() + rb.len()) as f64
}

/// Rank `known` strings by Jaro similarity to `unknown`, descending,
/// keeping only candidates scoring above `0.7`.
///
/// Used to produce "did you mean" suggestions for unrecognized tool names.
#[must_use]
pub fn suggest_similar<'a>(unknown: &str, known: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut candidates: Vec<(f64, String)> = known
        .into_iter()
        .map(|k| (strsim::jaro(unknown, k), k.to_string()))
        .filter(|(score, _)| *score > 0.7)
        .collect();
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    candidates.into_iter().map(|(_, s)| s).collect()
}

/// Extracts the `(name, type)` property map used by the schema kernel, keyed
/// by property name, for callers (e.g. `mcp-meta-dedup`) that need the raw
/// map rather than just a similarity score.
#[must_use]
pub fn schema_property_types(schema: &Value) -> HashMap<String, String> {
    property_pairs(schema).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_strings_are_identical() {
        assert_eq!(string_similarity("", ""), 1.0);
    }

    #[test]
    fn one_empty_scores_zero() {
        assert_eq!(string_similarity("foo", ""), 0.0);
        assert_eq!(string_similarity("", "foo"), 0.0);
    }

    #[test]
    fn is_symmetric() {
        assert_eq!(
            string_similarity("read_file", "read_files"),
            string_similarity("read_files", "read_file")
        );
        assert_eq!(string_similarity("martha", "martha"), 1.0);
    }

    #[test]
    fn matches_spec_example() {
        let s = string_similarity("read_file", "read_files");
        assert!((s - 0.974).abs() < 0.001, "got {s}");
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(string_similarity("ReadFile", "readfile"), 1.0);
    }

    #[test]
    fn schema_missing_scores_zero() {
        let a = json!({"type": "object"});
        assert_eq!(schema_similarity(Some(&a), None), 0.0);
        assert_eq!(schema_similarity(None, None), 0.0);
    }

    #[test]
    fn schema_deep_equal_short_circuits() {
        let a = json!({"type": "object", "properties": {"path": {"type": "string"}}});
        let b = a.clone();
        assert_eq!(schema_similarity(Some(&a), Some(&b)), 1.0);
    }

    #[test]
    fn schema_empty_properties_and_required_score_one() {
        let a = json!({"type": "object"});
        let b = json!({"type": "object", "additionalProperties": false});
        assert_eq!(schema_similarity(Some(&a), Some(&b)), 1.0);
    }

    #[test]
    fn schema_structural_blend() {
        // Same property name+type, no required arrays: propSim=1, reqSim=1.
        let a = json!({"properties": {"path": {"type": "string"}}});
        let b = json!({"properties": {"path": {"type": "string"}}, "required": []});
        assert_eq!(schema_similarity(Some(&a), Some(&b)), 1.0);
    }

    #[test]
    fn schema_partial_overlap() {
        let a = json!({"properties": {"path": {"type": "string"}, "recursive": {"type": "boolean"}}});
        let b = json!({"properties": {"path": {"type": "string"}}});
        // common=1, |A|=2, |B|=1 -> propSim = 2*1/3 = 0.6667; reqSim both empty -> 1
        let score = schema_similarity(Some(&a), Some(&b));
        assert!((score - (0.7 * (2.0 / 3.0) + 0.3)).abs() < 1e-9);
    }

    #[test]
    fn suggest_similar_filters_and_sorts() {
        let known = vec!["read_file", "write_file", "list_dir"];
        let out = suggest_similar("read_fle", known);
        assert_eq!(out.first().map(String::as_str), Some("read_file"));
    }
}
