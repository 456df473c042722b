//! Type-aware TTL/LRU result cache.
//!
//! Caches tool-call results keyed by `"<providerId>:<toolName>:<canonical
//! json args>"`. TTLs are chosen by a coarse classification of the tool name
//! and drift over time based on observed hit rate (`adapt_ttls`).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

const DEFAULT_MAX_SIZE: usize = 1000;
const MAX_TTL_MILLIS: i64 = 3_600_000;
const MIN_TTL_MILLIS: i64 = 60_000;

/// Coarse tool-type classification, used to pick a default TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolType {
    Filesystem,
    Database,
    Network,
    Computation,
    Static,
    Default,
}

impl ToolType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ToolType::Filesystem => "filesystem",
            ToolType::Database => "database",
            ToolType::Network => "network",
            ToolType::Computation => "computation",
            ToolType::Static => "static",
            ToolType::Default => "default",
        }
    }

    /// Default TTL for this tool type, in milliseconds.
    #[must_use]
    pub fn default_ttl_millis(self) -> i64 {
        match self {
            ToolType::Filesystem => 60_000,
            ToolType::Database => 180_000,
            ToolType::Network => 120_000,
            ToolType::Computation => 600_000,
            ToolType::Static => 3_600_000,
            ToolType::Default => 300_000,
        }
    }

    /// Inverse of [`Self::as_str`]: recover the enum from its canonical type
    /// name (as stored on a `CacheEntry` / used as the `tool_type_ttl_millis`
    /// key). Unknown names fall back to `Default`.
    #[must_use]
    pub fn from_type_name(name: &str) -> ToolType {
        match name {
            "filesystem" => ToolType::Filesystem,
            "database" => ToolType::Database,
            "network" => ToolType::Network,
            "computation" => ToolType::Computation,
            "static" => ToolType::Static,
            _ => ToolType::Default,
        }
    }
}

/// Classify a tool name by substring match (first match wins), lower-cased.
#[must_use]
pub fn classify_tool_type(tool_name: &str) -> ToolType {
    let name = tool_name.to_lowercase();
    const RULES: &[(&[&str], ToolType)] = &[
        (&["file", "read", "write"], ToolType::Filesystem),
        (&["db", "sql", "query"], ToolType::Database),
        (&["http", "api", "request"], ToolType::Network),
        (&["compute", "calculate", "process"], ToolType::Computation),
        (&["static", "const", "reference"], ToolType::Static),
    ];
    for (needles, ty) in RULES {
        if needles.iter().any(|n| name.contains(n)) {
            return *ty;
        }
    }
    ToolType::Default
}

/// Heuristic: should this tool call's result ever be cached?
///
/// Rejects tools whose name suggests non-deterministic output (`random`,
/// `uuid`, `current_time`, `now`) or whose arguments mention a timestamp or
/// "current" value.
#[must_use]
pub fn should_cache(tool_name: &str, arguments: &Value) -> bool {
    let name = tool_name.to_lowercase();
    const NAME_BLOCKLIST: &[&str] = &["random", "uuid", "current_time", "now"];
    if NAME_BLOCKLIST.iter().any(|n| name.contains(n)) {
        return false;
    }
    let args_json = arguments.to_string().to_lowercase();
    !(args_json.contains("timestamp") || args_json.contains("current"))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    tool_type: String,
    expiry_at: DateTime<Utc>,
    hit_count: u64,
    last_access: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_at <= now
    }
}

/// Aggregate cache statistics, as returned by `get_stats`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub hit_rate: f64,
    pub total_requests: u64,
    pub total_hits: u64,
    pub avg_hit_count: f64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub recommendations: Vec<String>,
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    total_requests: u64,
    total_hits: u64,
    tool_type_requests: HashMap<String, u64>,
    tool_type_ttl_millis: HashMap<String, i64>,
}

/// Type-aware, LRU-evicting, adaptively-TTL'd result cache.
pub struct ResultCache {
    max_size: usize,
    inner: RwLock<Inner>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl ResultCache {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                total_requests: 0,
                total_hits: 0,
                tool_type_requests: HashMap::new(),
                tool_type_ttl_millis: HashMap::new(),
            }),
        }
    }

    /// `tool_type` here is a canonical type name (`"database"`, `"network"`,
    /// ...), not a tool name — it must be mapped back to `ToolType` with
    /// `from_type_name`, not re-classified with `classify_tool_type` (which
    /// expects a tool *name* and would misclassify e.g. "database" itself).
    fn ttl_for(inner: &Inner, tool_type: &str) -> i64 {
        inner
            .tool_type_ttl_millis
            .get(tool_type)
            .copied()
            .unwrap_or_else(|| ToolType::from_type_name(tool_type).default_ttl_millis())
    }

    /// Insert `value` under `key` if `should_cache(tool_name, arguments)`
    /// allows it. No-op otherwise.
    pub fn set(
        &self,
        key: String,
        tool_name: &str,
        arguments: &Value,
        value: Value,
        ttl_override_millis: Option<i64>,
    ) {
        self.set_at(
            key,
            tool_name,
            arguments,
            value,
            ttl_override_millis,
            Utc::now(),
        );
    }

    /// Same as [`Self::set`] but with an explicit clock, for deterministic
    /// tests.
    pub fn set_at(
        &self,
        key: String,
        tool_name: &str,
        arguments: &Value,
        value: Value,
        ttl_override_millis: Option<i64>,
        now: DateTime<Utc>,
    ) {
        if !should_cache(tool_name, arguments) {
            return;
        }
        let tool_type = classify_tool_type(tool_name).as_str().to_string();
        let mut inner = self.inner.write();
        let ttl = ttl_override_millis.unwrap_or_else(|| Self::ttl_for(&inner, &tool_type));

        if inner.entries.len() >= self.max_size && !inner.entries.contains_key(&key) {
            Self::evict_lru(&mut inner);
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                tool_type,
                expiry_at: now + chrono::Duration::milliseconds(ttl),
                hit_count: 0,
                last_access: now,
                created_at: now,
            },
        );
    }

    fn evict_lru(inner: &mut Inner) {
        if let Some(oldest_key) = inner
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone())
        {
            inner.entries.remove(&oldest_key);
        }
    }

    /// Look up `key`. Expired entries are removed on sight and treated as a
    /// miss; per-tool-type request counts are only incremented on the hit
    /// path (they measure attempts *served by* the cache for that type).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Utc::now())
    }

    /// Same as [`Self::get`] but with an explicit clock, for deterministic
    /// tests.
    #[must_use]
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let mut inner = self.inner.write();
        inner.total_requests += 1;

        let expired = inner.entries.get(key).is_some_and(|e| e.is_expired(now));
        if expired {
            inner.entries.remove(key);
            return None;
        }

        let entry = inner.entries.get_mut(key)?;
        entry.hit_count += 1;
        entry.last_access = now;
        let value = entry.value.clone();
        let tool_type = entry.tool_type.clone();

        inner.total_hits += 1;
        *inner.tool_type_requests.entry(tool_type).or_insert(0) += 1;

        Some(value)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Recompute per-tool-type TTLs from observed hit rates, and return
    /// current aggregate stats. Called periodically by the server and on
    /// every meta-tool `get_cache_stats` invocation.
    pub fn get_stats(&self) -> CacheStats {
        self.adapt_ttls();
        let inner = self.inner.read();

        let size = inner.entries.len();
        let hit_rate = if inner.total_requests == 0 {
            0.0
        } else {
            inner.total_hits as f64 / inner.total_requests as f64
        };
        let avg_hit_count = if size == 0 {
            0.0
        } else {
            inner.entries.values().map(|e| e.hit_count).sum::<u64>() as f64 / size as f64
        };
        let oldest_entry = inner.entries.values().map(|e| e.created_at).min();
        let newest_entry = inner.entries.values().map(|e| e.created_at).max();

        let mut recommendations = Vec::new();
        if hit_rate < 0.3 {
            recommendations.push(
                "Low cache hit rate - consider adjusting TTLs or expanding cacheable tool types"
                    .to_string(),
            );
        }
        if size as f64 / self.max_size as f64 > 0.9 {
            recommendations.push(
                "Cache is near capacity - consider increasing max size to reduce eviction churn"
                    .to_string(),
            );
        }
        if hit_rate > 0.8 {
            recommendations
                .push("Excellent cache performance - current configuration is working well".to_string());
        }
        if inner.total_requests < 10 {
            recommendations
                .push("Insufficient data to make confident recommendations yet".to_string());
        }

        CacheStats {
            size,
            hit_rate,
            total_requests: inner.total_requests,
            total_hits: inner.total_hits,
            avg_hit_count,
            oldest_entry,
            newest_entry,
            recommendations,
        }
    }

    /// Per-tool-type hit rate: `avg hit count of live entries of that type /
    /// requests for that type` (zero requests -> 0).
    fn type_hit_rate(inner: &Inner, tool_type: &str) -> f64 {
        let requests = inner
            .tool_type_requests
            .get(tool_type)
            .copied()
            .unwrap_or(0);
        if requests == 0 {
            return 0.0;
        }
        let (sum, count) = inner
            .entries
            .values()
            .filter(|e| e.tool_type == tool_type)
            .fold((0u64, 0u64), |(sum, count), e| (sum + e.hit_count, count + 1));
        if count == 0 {
            return 0.0;
        }
        (sum as f64 / count as f64) / requests as f64
    }

    /// Adjust each observed tool type's TTL by its hit rate: `>0.7` scales up
    /// 1.2x (capped at 1h), `<0.2` scales down 0.8x (floored at 1min).
    pub fn adapt_ttls(&self) {
        let mut inner = self.inner.write();
        let types: Vec<String> = inner
            .entries
            .values()
            .map(|e| e.tool_type.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();

        for ty in types {
            let hit_rate = Self::type_hit_rate(&inner, &ty);
            let current = Self::ttl_for(&inner, &ty);
            let updated = if hit_rate > 0.7 {
                ((current as f64 * 1.2) as i64).min(MAX_TTL_MILLIS)
            } else if hit_rate < 0.2 {
                ((current as f64 * 0.8) as i64).max(MIN_TTL_MILLIS)
            } else {
                current
            };
            inner.tool_type_ttl_millis.insert(ty, updated);
        }
    }
}
