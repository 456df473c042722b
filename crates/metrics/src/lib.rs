//! Per-(provider, tool) performance metrics and the router's scoring
//! function.
//!
//! Entries are lazily created on first access and survive provider
//! disconnection (the store has no notion of "provider is gone", only
//! "provider hasn't been called recently").

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

/// Running performance stats for a single `(provider, tool)` pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_calls: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    pub avg_response_time_millis: f64,
    pub last_used: DateTime<Utc>,
}

impl PerformanceMetrics {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            total_calls: 0,
            failure_count: 0,
            success_rate: 1.0,
            avg_response_time_millis: 0.0,
            last_used: now,
        }
    }

    fn record(&mut self, success: bool, elapsed_millis: f64, now: DateTime<Utc>) {
        self.total_calls += 1;
        if !success {
            self.failure_count += 1;
        }
        self.last_used = now;
        self.success_rate =
            (self.total_calls - self.failure_count) as f64 / self.total_calls as f64;
        self.avg_response_time_millis +=
            (elapsed_millis - self.avg_response_time_millis) / self.total_calls as f64;
    }

    /// The router's scoring function: `0.5·successRate + 0.3·responseScore +
    /// 0.2·recencyScore`, or `0.5` (neutral) when there's no call history yet.
    #[must_use]
    pub fn score(&self, now: DateTime<Utc>) -> f64 {
        if self.total_calls == 0 {
            return 0.5;
        }
        let response_score = (1.0 - self.avg_response_time_millis / 10_000.0).max(0.0);
        let hours_since_used = (now - self.last_used).num_seconds() as f64 / 3600.0;
        let recency_score = if hours_since_used < 1.0 {
            1.0
        } else if hours_since_used < 24.0 {
            0.8
        } else if hours_since_used < 168.0 {
            0.6
        } else {
            0.4
        };
        0.5 * self.success_rate + 0.3 * response_score + 0.2 * recency_score
    }
}

/// Key identifying a metrics entry: `(provider_id, tool_name)`, where
/// `tool_name` is the *unqualified* tool name (see `suggest_tools`'s open
/// question in SPEC_FULL.md §2.2).
pub type MetricsKey = (String, String);

/// Thread-safe metrics store, linearizable per `record`/`get` call.
#[derive(Default)]
pub struct MetricsStore {
    inner: RwLock<HashMap<MetricsKey, PerformanceMetrics>>,
}

impl MetricsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one invocation against `(provider_id,
    /// tool_name)`, creating the entry if this is the first call.
    pub fn record(&self, provider_id: &str, tool_name: &str, success: bool, elapsed_millis: f64) {
        self.record_at(provider_id, tool_name, success, elapsed_millis, Utc::now());
    }

    /// Same as [`Self::record`] but with an explicit clock, for deterministic
    /// tests.
    pub fn record_at(
        &self,
        provider_id: &str,
        tool_name: &str,
        success: bool,
        elapsed_millis: f64,
        now: DateTime<Utc>,
    ) {
        let key = (provider_id.to_string(), tool_name.to_string());
        let mut guard = self.inner.write();
        guard
            .entry(key)
            .or_insert_with(|| PerformanceMetrics::fresh(now))
            .record(success, elapsed_millis, now);
    }

    /// Current metrics for `(provider_id, tool_name)`, or the fresh-entry
    /// default if it has never been recorded.
    #[must_use]
    pub fn get(&self, provider_id: &str, tool_name: &str) -> PerformanceMetrics {
        let key = (provider_id.to_string(), tool_name.to_string());
        self.inner
            .read()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| PerformanceMetrics::fresh(Utc::now()))
    }

    /// The router's score for `(provider_id, tool_name)` as of now.
    #[must_use]
    pub fn score(&self, provider_id: &str, tool_name: &str) -> f64 {
        self.get(provider_id, tool_name).score(Utc::now())
    }

    /// Snapshot of every recorded metrics entry, for `analyze_usage` and
    /// `optimize_routing`.
    #[must_use]
    pub fn all(&self) -> Vec<(MetricsKey, PerformanceMetrics)> {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Metrics entries for a single provider.
    #[must_use]
    pub fn for_provider(&self, provider_id: &str) -> Vec<(String, PerformanceMetrics)> {
        self.inner
            .read()
            .iter()
            .filter(|((pid, _), _)| pid == provider_id)
            .map(|((_, tool), m)| (tool.clone(), m.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_entry_defaults() {
        let store = MetricsStore::new();
        let m = store.get("p", "t");
        assert_eq!(m.total_calls, 0);
        assert_eq!(m.failure_count, 0);
        assert_eq!(m.success_rate, 1.0);
        assert_eq!(m.avg_response_time_millis, 0.0);
    }

    #[test]
    fn neutral_score_with_no_history() {
        let store = MetricsStore::new();
        assert_eq!(store.score("p", "t"), 0.5);
    }

    #[test]
    fn invariant_success_rate_bounds() {
        let store = MetricsStore::new();
        let now = Utc::now();
        store.record_at("p", "t", true, 10.0, now);
        store.record_at("p", "t", false, 20.0, now);
        let m = store.get("p", "t");
        assert!(m.failure_count <= m.total_calls);
        assert_eq!(
            m.success_rate,
            (m.total_calls - m.failure_count) as f64 / m.total_calls as f64
        );
    }

    #[test]
    fn running_mean_latency() {
        let store = MetricsStore::new();
        let now = Utc::now();
        store.record_at("p", "t", true, 100.0, now);
        store.record_at("p", "t", true, 200.0, now);
        let m = store.get("p", "t");
        assert_eq!(m.total_calls, 2);
        assert!((m.avg_response_time_millis - 150.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_s1_routing_by_success_rate() {
        let store = MetricsStore::new();
        let now = Utc::now();
        for _ in 0..8 {
            store.record_at("A", "read", true, 100.0, now);
        }
        for _ in 0..2 {
            store.record_at("A", "read", false, 100.0, now);
        }
        for _ in 0..10 {
            store.record_at("B", "read", true, 200.0, now);
        }

        let score_a = store.get("A", "read").score(now);
        let score_b = store.get("B", "read").score(now);
        assert!((score_a - 0.897).abs() < 0.001, "score_a={score_a}");
        assert!((score_b - 0.994).abs() < 0.001, "score_b={score_b}");
        assert!(score_b > score_a);
    }

    #[test]
    fn recency_steps_down_over_time() {
        let store = MetricsStore::new();
        let now = Utc::now();
        store.record_at("p", "t", true, 0.0, now - Duration::hours(200));
        let m = store.get("p", "t");
        assert!((m.score(now) - (0.5 + 0.3 + 0.2 * 0.4)).abs() < 1e-9);
    }
}
