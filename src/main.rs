use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::EnvFilter;

use mcp_upwork::adapters::cache::LruRecordCache;
use mcp_upwork::adapters::diagnostics::{FileDiagnostics, NoopDiagnostics};
use mcp_upwork::adapters::http::UpworkFetcher;
use mcp_upwork::config::load_config;
use mcp_upwork::mcp::server::UpworkMcpServer;
use mcp_upwork::ports::cache::RecordCache;
use mcp_upwork::ports::diagnostics::DiagnosticsSink;

fn find_config_path() -> PathBuf {
    let candidates = [PathBuf::from("config.yaml"), binary_dir().join("config.yaml")];

    for path in &candidates {
        if path.exists() {
            return path.clone();
        }
    }

    candidates[0].clone()
}

fn binary_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is reserved for MCP JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting mcp-upwork server");

    let config_path = find_config_path();
    let config = load_config(&config_path)?;

    let cache: Arc<dyn RecordCache> = Arc::new(LruRecordCache::new(config.cache.max_entries));
    let diagnostics: Arc<dyn DiagnosticsSink> = if config.diagnostics.enabled {
        tracing::info!(directory = %config.diagnostics.directory, "Diagnostic dumps enabled");
        Arc::new(FileDiagnostics::new(&config.diagnostics.directory))
    } else {
        Arc::new(NoopDiagnostics)
    };

    if config.scraper.authenticated && config.scraper.cookie.is_none() {
        tracing::warn!("scraper.authenticated is set but no cookie is configured");
    }

    let fetcher = UpworkFetcher::new(
        config.scraper.clone(),
        &config.cache,
        cache,
        Arc::clone(&diagnostics),
    )?;
    let server = UpworkMcpServer::new(Arc::new(fetcher), diagnostics, config.scraper);

    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
