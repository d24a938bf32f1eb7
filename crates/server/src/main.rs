//! geocensus server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use geocensus_core::{AppConfig, CacheDb, PredicateGateway, QueryEngine};
use geocensus_store::LocationStore;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use std::sync::Arc;
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
    let store_path = config.require_store_db_path()?;

    let cache = CacheDb::open(&config.cache_db_path)
        .await?
        .with_ttl_policy(config.ttl_policy());
    let store = LocationStore::open(store_path).await?;
    let gateway = PredicateGateway::new(Arc::new(store.clone()), config.upstream_timeout());
    let engine = Arc::new(QueryEngine::new(Arc::new(cache), gateway).with_limits(config.query_limits()));

    tracing::info!(
        cache_db = %config.cache_db_path.display(),
        store_db = %store_path.display(),
        "Starting geocensus server on stdio transport"
    );

    let handler = handler::GeocensusServer::new(engine.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    if let Err(e) = engine.close().await {
        tracing::warn!(error = %e, "failed to close cache");
    }
    store.close().await?;

    Ok(())
}
