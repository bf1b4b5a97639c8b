// SPDX-License-Identifier: AGPL-3.0-only
//! Secrets API server.
//!
//! Exposes the engine's operations under `/v1/consul/...` and the lease
//! callbacks under `/v1/sys/leases/...`.

mod handlers;
mod models;

pub use handlers::build_api_router;

use crate::http::ServerState;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Start the secrets API server.
pub async fn serve_api(addr: SocketAddr, app: Router, state: ServerState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "secrets API server listening");
    state.set_ready(true);

    let result = axum::serve(listener, app).await;
    state.set_ready(false);
    if let Err(e) = result {
        error!(error = %e, "API server error");
        return Err(e.into());
    }
    Ok(())
}
