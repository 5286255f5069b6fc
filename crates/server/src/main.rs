//! caepi-mcp server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use caepi_client::RemoteSnapshotSource;
use caepi_core::{AppConfig, DatasetCache, RegistryService};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

/// Column names shipped with the binary, used when `data_dir` has none.
const BUNDLED_SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../data/config_nomes_colunas.csv"));

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        export_dir = %config.export_dir.display(),
        ftp = %config.ftp_url(),
        ttl_secs = config.ttl_secs,
        "Starting caepi-mcp server on stdio transport"
    );

    let schema_path = config.schema_path();
    if !tokio::fs::try_exists(&schema_path).await? {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        tokio::fs::write(&schema_path, BUNDLED_SCHEMA).await?;
        tracing::info!(path = %schema_path.display(), "wrote bundled column schema");
    }

    let source = RemoteSnapshotSource::from_config(&config)?;
    let cache = Arc::new(DatasetCache::new(&config, Arc::new(source)));
    let service = RegistryService::new(cache);

    let handler = handler::CaepiServer::new(service, &config.export_dir);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
