// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket endpoint plus a small HTTP surface for probes.

pub mod connection;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::ServerState;

/// Clients connect to the root path; the health probe lives under `/api/v1`.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(ws::ws_handler))
        .route("/api/v1/health", get(http::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
