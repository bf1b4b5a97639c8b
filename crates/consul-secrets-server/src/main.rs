use crate::api::{build_api_router, serve_api};
use crate::config::{Args, LogFormat};
use crate::http::{serve_http, ServerState};
use crate::leases::LeaseTable;
use anyhow::{Context, Result};
use clap::Parser;
use consul_secrets::{ConsulBackend, HttpClientFactory, MemoryStorage};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log filter")?;
    let builder = tracing_subscriber::fmt()
        .with_timer(UtcTime::rfc_3339())
        .with_env_filter(filter);
    match args.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }

    warn!("using in-memory storage; configuration and roles are lost on restart");

    let backend = ConsulBackend::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(HttpClientFactory::new(args.client_options())),
        args.mount_config(),
    );
    info!(
        default_lease_ttl = ?backend.mount().default_lease_ttl,
        max_lease_ttl = ?backend.mount().max_lease_ttl,
        "mount configured"
    );

    let state = ServerState::new();

    if let Some(addr) = args.listen_http {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_http(addr, state).await {
                error!(error = %err, "health listener stopped");
            }
        });
    }

    let app = build_api_router(backend, LeaseTable::new());
    serve_api(args.listen_api, app, state)
        .await
        .with_context(|| format!("secrets API on {} stopped", args.listen_api))
}

mod api;
mod config;
mod http;
mod leases;
mod metrics;
