//! `ServerHandler` implementation: the upstream-facing MCP surface.
//!
//! Translates `tools/list` and `tools/call` into aggregator/meta-tool
//! operations. One instance per process, wrapping a single `Aggregator`.

use crate::aggregator::{Aggregator, ExposedTools};
use crate::meta_tools;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, InitializeRequestParam,
    ListToolsResult, PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{Peer, RequestContext};
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// The MCP server presented to the upstream client. Wraps an `Aggregator`
/// and the fixed meta-tool surface (§4.8).
#[derive(Clone)]
pub struct MetaServer {
    aggregator: Arc<Aggregator>,
    peers: Arc<RwLock<Vec<Peer<RoleServer>>>>,
}

impl MetaServer {
    #[must_use]
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self {
            aggregator,
            peers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Notify every upstream peer that the tool list changed. Callers must
    /// have already rebuilt the aggregator's inventory; this only handles
    /// the upstream `notifications/tools/list_changed` fan-out.
    async fn notify_tool_list_changed(&self) {
        let mut peers = self.peers.write().await;
        let mut retained = Vec::with_capacity(peers.len());
        for peer in peers.drain(..) {
            match peer.notify_tool_list_changed().await {
                Ok(()) => retained.push(peer),
                Err(e) => warn!(error = %e, "dropping upstream peer that failed notification"),
            }
        }
        *peers = retained;
    }

    fn meta_tool_specs() -> Vec<Tool> {
        meta_tools::META_TOOL_NAMES
            .iter()
            .map(|name| build_tool(name, meta_tools::description(name), meta_tools::input_schema(name)))
            .collect()
    }

    fn exposed_tool_specs(&self) -> Vec<Tool> {
        match self.aggregator.exposed_tools() {
            ExposedTools::Merged(merged) => merged
                .iter()
                .map(|m| build_tool(&m.name, &m.description, m.input_schema.clone()))
                .collect(),
            ExposedTools::Namespaced(tools) => tools
                .iter()
                .map(|t| {
                    build_tool(
                        &t.qualified_name,
                        t.spec.description.as_deref().unwrap_or_default(),
                        t.spec.input_schema.clone(),
                    )
                })
                .collect(),
        }
    }
}

/// Build an `rmcp::model::Tool` from a name/description/JSON-Schema triple.
fn build_tool(name: &str, description: &str, input_schema: Value) -> Tool {
    let schema_map = match input_schema {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    Tool {
        name: name.to_string().into(),
        title: None,
        description: Some(description.to_string().into()),
        input_schema: Arc::new(schema_map),
        output_schema: None,
        icons: None,
        annotations: None,
    }
}

fn success_result(value: Value) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(value.to_string())],
        structured_content: Some(value),
        is_error: Some(false),
        meta: None,
    }
}

fn error_result(message: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(message.into())],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

impl ServerHandler for MetaServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_tool_list_changed()
                .build(),
            server_info: Implementation {
                name: "mcp-meta-server".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Aggregates tools from downstream MCP servers behind eight meta-tools: \
                 discover_servers, analyze_usage, get_cache_stats, suggest_tools, \
                 batch_execute, optimize_routing, configure_deduplication, and \
                 analyze_tool_similarity. Everything else is either a merged or \
                 namespaced downstream tool."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<ServerInfo, McpError> {
        self.peers.write().await.push(context.peer);
        Ok(self.get_info())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let mut tools = Self::meta_tool_specs();
        tools.extend(self.exposed_tool_specs());
        Ok(ListToolsResult {
            next_cursor: None,
            tools,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let name = request.name.to_string();
        let arguments = Value::Object(request.arguments.unwrap_or_default());

        if meta_tools::is_meta_tool(&name) {
            // §4.8: the tool inventory is only rebuilt (and upstream notified)
            // when `enabled` is actually part of this call, not on every
            // configure_deduplication invocation (e.g. one that only adjusts
            // `similarityThreshold` or asks for `getStats`).
            let toggles_enabled = name == "configure_deduplication"
                && arguments.get("enabled").is_some();
            return match meta_tools::call(&self.aggregator, &name, arguments).await {
                Ok(value) => {
                    if toggles_enabled {
                        self.notify_tool_list_changed().await;
                    }
                    Ok(success_result(value))
                }
                Err(e) => Ok(error_result(e.to_string())),
            };
        }

        match self.aggregator.dispatch(&name, arguments).await {
            Ok(value) => Ok(success_result(value)),
            Err(e) => Ok(error_result(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_tool_defaults_missing_schema_to_empty_object() {
        let tool = build_tool("x", "desc", Value::Null);
        assert!(tool.input_schema.is_empty());
        assert_eq!(tool.description.as_deref(), Some("desc"));
    }
}
