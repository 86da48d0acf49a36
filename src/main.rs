use anyhow::{Context, Result};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::{AppConfig, Backend};
use services::{
    auth::{Authorizer, OpenAuthorizer, StaticTokenAuthorizer},
    blob_store::BlobStore,
    disk_store::DiskBlobStore,
    lease::AssemblyLeases,
    memory_store::MemoryBlobStore,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting chunk-assembler with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Handle migration mode ---
    if migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }
    db::run_migrations(&db).await?;

    // --- Blob store ---
    let store: Arc<dyn BlobStore> = match cfg.backend {
        Backend::Disk => {
            if !Path::new(&cfg.storage_dir).exists() {
                fs::create_dir_all(&cfg.storage_dir).with_context(|| {
                    format!("creating storage directory {}", cfg.storage_dir)
                })?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir);
            }
            Arc::new(DiskBlobStore::new(cfg.storage_dir.clone()))
        }
        Backend::Memory => {
            tracing::warn!("Using in-memory blob store; data is lost on exit");
            Arc::new(MemoryBlobStore::new())
        }
    };

    // --- Authorizer ---
    let authorizer: Arc<dyn Authorizer> = if cfg.auth_tokens.is_empty() {
        tracing::warn!("No upload tokens configured; chunk uploads are unauthenticated");
        Arc::new(OpenAuthorizer)
    } else {
        tracing::info!("Loaded {} upload token(s)", cfg.auth_tokens.len());
        Arc::new(StaticTokenAuthorizer::new(
            cfg.auth_tokens
                .iter()
                .map(|entry| (entry.principal.clone(), entry.token.as_str())),
        ))
    };

    // --- Initialize core services ---
    let leases = AssemblyLeases::new(db.clone(), cfg.lease_ttl);
    let state = AppState::new(db, store, authorizer, leases, cfg.fetch_concurrency);

    // --- Build router ---
    let app = routes::routes::app(state, cfg.max_chunk_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
