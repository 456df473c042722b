//! Entry point: wires discovery, the provider registry, the aggregator, and
//! the upstream stdio MCP surface together.

mod aggregator;
mod cli;
mod config;
mod discovery;
mod error;
mod mcp_server;
mod meta_tools;
mod provider;
mod registry;
mod router;

use aggregator::Aggregator;
use clap::Parser;
use cli::Cli;
use mcp_meta_dedup::DeduplicationConfig;
use mcp_server::MetaServer;
use registry::ProviderRegistry;
use rmcp::service::ServiceExt;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "startup failed");
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(path) = &cli.config {
        let configs = discovery::configs_from_path(path);
        let marshalled = serde_json::to_string(&configs)?;
        // SAFETY: single-threaded at this point in startup, before any
        // other code reads environment variables.
        unsafe {
            std::env::set_var("MCP_SERVER_CONFIG", marshalled);
        }
    }

    let mut dedup_config = DeduplicationConfig::default();
    if cli.disable_dedup {
        dedup_config.enabled = false;
    }
    if let Some(threshold) = cli.sim_threshold {
        dedup_config.similarity_threshold = threshold;
    }
    if cli.auto_merge {
        dedup_config.auto_merge = true;
    }

    let registry = ProviderRegistry::new();
    let configs = discovery::discover_providers();
    tracing::info!(provider_count = configs.len(), "discovered provider configs");
    registry.connect_all(configs).await;

    let aggregator = Arc::new(Aggregator::new(registry, dedup_config));
    let server = MetaServer::new(aggregator.clone());

    let transport = rmcp::transport::io::stdio();
    let running = server
        .serve(transport)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "failed to start MCP transport"))?;

    tokio::select! {
        result = running.waiting() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "upstream connection ended with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt signal, shutting down");
        }
    }

    aggregator.shutdown().await;
    Ok(())
}
