//! Command-line surface (external-interfaces §6).

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "mcp-meta-server", version, about = "Meta-orchestrator for downstream MCP servers")]
pub struct Cli {
    /// A JSON file or directory of `*.mcp.json` files; marshalled into
    /// `MCP_SERVER_CONFIG` before discovery runs.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Minimum level of log line to emit, written to stderr.
    #[arg(short, long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Start with deduplication disabled.
    #[arg(long)]
    pub disable_dedup: bool,

    /// Similarity threshold (0..1) for the deduplication engine.
    #[arg(long, value_name = "FLOAT")]
    pub sim_threshold: Option<f64>,

    /// Start with auto-merge enabled for the deduplication engine.
    #[arg(long)]
    pub auto_merge: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}
