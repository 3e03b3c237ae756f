// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::state::ServerState;

/// Response for `GET /api/v1/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub experiments: usize,
}

pub async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let status = if state.shutdown.is_cancelled() { "stopping" } else { "running" };
    Json(HealthResponse {
        status: status.to_owned(),
        connections: state.connections.len(),
        experiments: state.experiments.len(),
    })
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
