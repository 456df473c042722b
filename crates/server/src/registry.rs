//! Lifecycle of downstream MCP child processes: concurrent connect,
//! snapshotting, and shutdown.

use crate::config::{sanitize_argument, validate_command};
use crate::error::{MetaServerError, Result};
use crate::provider::{Provider, ProviderConfig, ProviderStatus, ToolSpec};
use parking_lot::RwLock;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{RoleClient, RunningService, ServiceExt};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::process::Command;
use tracing::warn;

/// Owns every registered provider, keyed by id.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Provider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to connect to every config concurrently. Duplicate ids (after
    /// the first) and configs that fail command validation are rejected
    /// up front and never attempted.
    pub async fn connect_all(&self, configs: Vec<ProviderConfig>) {
        let mut seen_ids = HashSet::new();
        let mut accepted = Vec::new();

        for config in configs {
            if !seen_ids.insert(config.id.clone()) {
                warn!(provider_id = %config.id, "duplicate provider id, ignoring");
                continue;
            }
            if let Err(reason) = validate_command(&config.command) {
                warn!(provider_id = %config.id, %reason, "provider command failed validation, dropping");
                continue;
            }
            accepted.push(config);
        }

        let connects = accepted.into_iter().map(|config| self.connect_one(config));
        futures::future::join_all(connects).await;
    }

    async fn connect_one(&self, config: ProviderConfig) {
        let id = config.id.clone();
        self.providers
            .write()
            .insert(id.clone(), Provider::connecting(config.clone()));

        match spawn_and_handshake(&config).await {
            Ok((session, tools)) => {
                let mut guard = self.providers.write();
                if let Some(provider) = guard.get_mut(&id) {
                    provider.session = Some(Arc::new(session));
                    provider.tools = tools;
                    provider.status = ProviderStatus::Connected;
                }
            }
            Err(e) => {
                warn!(provider_id = %id, error = %e, "provider failed to connect");
                let mut guard = self.providers.write();
                if let Some(provider) = guard.get_mut(&id) {
                    provider.status = ProviderStatus::Disconnected;
                }
            }
        }
    }

    /// Current tool lists for every connected provider, as
    /// `(provider_id, Vec<ToolSpec>)`.
    #[must_use]
    pub fn connected_tools(&self) -> Vec<(String, Vec<ToolSpec>)> {
        self.providers
            .read()
            .values()
            .filter(|p| p.is_connected())
            .map(|p| (p.config.id.clone(), p.tools.clone()))
            .collect()
    }

    #[must_use]
    pub fn is_connected(&self, provider_id: &str) -> bool {
        self.providers
            .read()
            .get(provider_id)
            .is_some_and(Provider::is_connected)
    }

    /// Snapshot summary used by the `discover_servers` meta-tool.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProviderSnapshot> {
        self.providers
            .read()
            .values()
            .map(|p| ProviderSnapshot {
                id: p.config.id.clone(),
                name: p.config.name.clone(),
                description: p.config.description.clone(),
                status: p.status,
                tool_count: p.tools.len(),
                command: p.config.command.clone(),
            })
            .collect()
    }

    /// Invoke `tool_name` on `provider_id`. Fails if the provider is not
    /// connected or has no live session.
    pub async fn call_tool(
        &self,
        provider_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<rmcp::model::CallToolResult> {
        let session = {
            let guard = self.providers.read();
            let provider = guard
                .get(provider_id)
                .ok_or_else(|| MetaServerError::ProviderUnavailable(format!("unknown provider '{provider_id}'")))?;
            if !provider.is_connected() {
                return Err(MetaServerError::ProviderUnavailable(format!(
                    "provider '{provider_id}' is not connected"
                )));
            }
            provider.session.clone().ok_or_else(|| {
                MetaServerError::ProviderUnavailable(format!("provider '{provider_id}' has no live session"))
            })?
        };

        let arguments = arguments.as_object().cloned();
        session
            .peer()
            .call_tool(CallToolRequestParam {
                name: tool_name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| MetaServerError::ToolInvocation(e.to_string()))
    }

    /// Close every live session, then mark every provider disconnected.
    /// Idempotent.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<RunningService<RoleClient, ()>>> = self
            .providers
            .read()
            .values()
            .filter_map(|p| p.session.clone())
            .collect();
        for session in sessions {
            session.cancellation_token().cancel();
        }
        let mut guard = self.providers.write();
        for provider in guard.values_mut() {
            provider.session = None;
            provider.status = ProviderStatus::Disconnected;
        }
    }
}

/// Summary of one provider's current state, for introspection.
#[derive(Debug, Clone)]
pub struct ProviderSnapshot {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ProviderStatus,
    pub tool_count: usize,
    pub command: Vec<String>,
}

async fn spawn_and_handshake(
    config: &ProviderConfig,
) -> anyhow::Result<(RunningService<RoleClient, ()>, Vec<ToolSpec>)> {
    let sanitized: Vec<String> = config.command.iter().map(|arg| sanitize_argument(arg)).collect();
    let (executable, args) = sanitized.split_first().ok_or_else(|| anyhow::anyhow!("empty command"))?;

    let mut cmd = Command::new(executable);
    cmd.args(args);
    let transport = TokioChildProcess::new(cmd.configure(|_| {}))?;
    let running = ().serve(transport).await?;

    let list = running.peer().list_tools(Default::default()).await?;
    let tools = list
        .tools
        .into_iter()
        .map(|t| ToolSpec {
            name: t.name.to_string(),
            description: t.description.map(|d| d.to_string()),
            input_schema: t.schema_as_json_value(),
        })
        .collect();

    Ok((running, tools))
}
