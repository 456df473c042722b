//! Error types for the meta-server.

use thiserror::Error;

/// Main error type for the meta-server's runtime paths.
#[derive(Error, Debug)]
pub enum MetaServerError {
    /// A provider config is malformed or fails command validation. Never
    /// fatal: the provider is dropped and startup continues.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A provider exists but is not `connected`.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A remote tool call failed on every attempted candidate.
    #[error("Tool invocation failed: {0}")]
    ToolInvocation(String),

    /// Bad arguments to a meta-tool.
    #[error("Meta-tool usage error: {0}")]
    MetaToolUsage(String),

    /// An outbound call was canceled by shutdown.
    #[error("Shutdown in progress: {0}")]
    Shutdown(String),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for meta-server operations.
pub type Result<T> = std::result::Result<T, MetaServerError>;
