// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod broadcast;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod experiment;
pub mod gate;
pub mod middleware;
pub mod protocol;
pub mod state;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::state::ServerState;

/// Bind the configured address and serve until the state's shutdown token
/// is cancelled.
pub async fn run(state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = state.config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("gama-server listening on {}", listener.local_addr()?);
    serve(listener, state).await
}

/// Serve on an already bound listener. Every experiment is closed and every
/// socket dropped once the shutdown token fires.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> anyhow::Result<()> {
    let router = transport::build_router(Arc::clone(&state));
    let shutdown = state.shutdown.clone();
    axum::serve(listener, router).with_graceful_shutdown(async move { shutdown.cancelled().await }).await?;

    state.dispose_all();
    state.connections.close_all();
    info!("gama-server stopped");
    Ok(())
}
