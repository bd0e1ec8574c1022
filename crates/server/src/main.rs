//! tidyscrape server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tidyscrape_client::Pipeline;
use tidyscrape_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        cache_enabled = config.cache_enabled,
        db_path = %config.db_path.display(),
        coalesce_fetches = config.coalesce_fetches,
        "Starting tidyscrape server on stdio transport"
    );

    let pipeline = Pipeline::open(&config).await?;
    let handler = handler::TidyscrapeServer::new(Arc::new(pipeline));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
