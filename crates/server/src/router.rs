//! Picks a primary provider plus an ordered fallback chain for a tool call
//! target, scoring candidates via the metrics store.

use mcp_meta_metrics::MetricsStore;

/// Where a tool call should be routed: one candidate for a namespaced
/// target, or a scored primary + fallbacks for a merged one.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub primary: String,
    pub fallbacks: Vec<String>,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// A candidate provider for a merged target: the provider id and the
/// member's (possibly renamed) tool name on that provider.
#[derive(Debug, Clone)]
pub struct RoutingCandidate {
    pub provider_id: String,
    pub tool_name: String,
}

/// Route a namespaced target `"<providerId>:<toolName>"`: the only
/// candidate is `provider_id`, present only if it is connected.
#[must_use]
pub fn route_namespaced(provider_id: &str, connected: bool) -> Option<RoutingDecision> {
    if !connected {
        return None;
    }
    Some(RoutingDecision {
        primary: provider_id.to_string(),
        fallbacks: Vec::new(),
        confidence: 1.0,
        reasons: vec!["namespaced target has a single candidate".to_string()],
    })
}

/// Route a merged target: rank `candidates` (already filtered to connected
/// providers, in member insertion order) by the scoring function. The top
/// scorer is primary; the next three are fallbacks.
#[must_use]
pub fn route_merged(candidates: &[RoutingCandidate], metrics: &MetricsStore) -> Option<RoutingDecision> {
    if candidates.is_empty() {
        return None;
    }

    let mut scored: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, metrics.score(&c.provider_id, &c.tool_name)))
        .collect();

    // Stable sort descending by score keeps insertion order as the
    // tie-break, since `scored` is built in candidate order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let primary_idx = scored[0].0;
    let confidence = scored[0].1;
    let fallbacks: Vec<String> = scored
        .iter()
        .skip(1)
        .take(3)
        .map(|(i, _)| candidates[*i].provider_id.clone())
        .collect();

    Some(RoutingDecision {
        primary: candidates[primary_idx].provider_id.clone(),
        fallbacks,
        confidence,
        reasons: vec!["scored by success rate, response time, and recency".to_string()],
    })
}
