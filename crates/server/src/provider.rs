//! Downstream provider configuration and lifecycle state.

use rmcp::service::{RoleClient, RunningService};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A downstream MCP server to spawn and connect to. Immutable once
/// registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    /// First element is the executable, the rest are its arguments.
    pub command: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Lifecycle status of a registered provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// A tool advertised by a provider. Plain struct (not `rmcp::model::Tool`) so
/// the similarity/dedup/cache/metrics crates don't need an `rmcp` dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// A registered downstream server. Retained with `session = None` after a
/// transport failure so its metrics history survives disconnection.
pub struct Provider {
    pub config: ProviderConfig,
    pub session: Option<Arc<RunningService<RoleClient, ()>>>,
    pub tools: Vec<ToolSpec>,
    pub status: ProviderStatus,
}

impl Provider {
    #[must_use]
    pub fn connecting(config: ProviderConfig) -> Self {
        Self {
            config,
            session: None,
            tools: Vec::new(),
            status: ProviderStatus::Connecting,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == ProviderStatus::Connected
    }
}
