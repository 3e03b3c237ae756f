// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket integration tests using real connections against an in-process
//! axum server.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use gama_server::config::ServerConfig;
use gama_server::test_support::{spawn_ws_server, StateBuilder, SAMPLE_MODEL};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsTx = futures_util::stream::SplitSink<WsStream, WsMessage>;
type WsRx = futures_util::stream::SplitStream<WsStream>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn ws_send(stream: &mut WsTx, value: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    stream.send(WsMessage::Text(text.into())).await.map_err(|e| anyhow::anyhow!("ws send: {e}"))?;
    Ok(())
}

/// Next text frame, skipping pings.
async fn ws_recv(stream: &mut WsRx, timeout: Duration) -> anyhow::Result<Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let msg = tokio::time::timeout_at(deadline, stream.next())
            .await
            .map_err(|_| anyhow::anyhow!("ws recv timeout"))?
            .ok_or_else(|| anyhow::anyhow!("ws stream closed"))?
            .map_err(|e| anyhow::anyhow!("ws recv: {e}"))?;
        match msg {
            WsMessage::Text(text) => return Ok(serde_json::from_str(&text)?),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => anyhow::bail!("expected Text message, got {other:?}"),
        }
    }
}

/// Receive until a frame matches, returning it and everything skipped.
async fn ws_recv_until(
    stream: &mut WsRx,
    matches: impl Fn(&Value) -> bool,
) -> anyhow::Result<(Value, Vec<Value>)> {
    let mut skipped = vec![];
    loop {
        let frame = ws_recv(stream, RECV_TIMEOUT).await?;
        if matches(&frame) {
            return Ok((frame, skipped));
        }
        skipped.push(frame);
    }
}

/// Connect and consume the greeting. Returns the socket id.
async fn ws_connect(addr: &std::net::SocketAddr) -> anyhow::Result<(WsTx, WsRx, String)> {
    let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
        .await
        .map_err(|e| anyhow::anyhow!("ws connect: {e}"))?;
    let (tx, mut rx) = stream.split();
    let greeting = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(greeting["type"], "ConnectionSuccessful", "greeting: {greeting}");
    let socket_id = greeting["content"].as_str().unwrap_or_default().to_owned();
    Ok((tx, rx, socket_id))
}

fn response_to(kind: &'static str) -> impl Fn(&Value) -> bool {
    move |frame| frame["command"]["type"] == kind
}

fn status(content: &'static str) -> impl Fn(&Value) -> bool {
    move |frame| frame["type"] == "SimulationStatus" && frame["content"] == content
}

#[tokio::test]
async fn connect_greets_with_socket_id() -> anyhow::Result<()> {
    let state = StateBuilder::new().build();
    let (addr, _handle) = spawn_ws_server(state.clone()).await?;

    let (_tx, _rx, first) = ws_connect(&addr).await?;
    let (_tx2, _rx2, second) = ws_connect(&addr).await?;
    assert!(!first.is_empty());
    assert_ne!(first, second);
    Ok(())
}

#[tokio::test]
async fn malformed_and_unknown_requests() -> anyhow::Result<()> {
    let state = StateBuilder::new().build();
    let (addr, _handle) = spawn_ws_server(state).await?;
    let (mut tx, mut rx, _) = ws_connect(&addr).await?;

    tx.send(WsMessage::Text("{\"type\": ".into())).await?;
    let resp = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(resp["type"], "MalformedRequest", "response: {resp}");

    ws_send(&mut tx, &json!({"type": "launch"})).await?;
    let resp = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(resp["type"], "GamaServerError");
    assert_eq!(resp["content"], "Invalid command type: launch");

    ws_send(&mut tx, &json!({"type": "evaluate", "expr": "6 * 7"})).await?;
    let resp = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(resp["content"], "42");
    Ok(())
}

#[tokio::test]
async fn load_play_pause_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("counter.gaml");
    std::fs::write(&model, SAMPLE_MODEL)?;

    let state = StateBuilder::new().build();
    let (addr, _handle) = spawn_ws_server(state.clone()).await?;
    let (mut tx, mut rx, _) = ws_connect(&addr).await?;

    ws_send(&mut tx, &json!({"type": "load", "model": model.display().to_string(), "experiment": "run"}))
        .await?;
    let (loaded, mut seen) = ws_recv_until(&mut rx, response_to("load")).await?;
    assert_eq!(loaded["type"], "CommandExecutedSuccessfully", "load: {loaded}");
    let exp_id = loaded["exp_id"].as_str().unwrap_or_default().to_owned();
    if !seen.iter().any(status("PAUSED")) {
        let (_, more) = ws_recv_until(&mut rx, status("PAUSED")).await?;
        seen.extend(more);
    }
    assert!(seen.iter().any(|f| f["type"] == "SimulationOutput" && f["content"] == "ready"));

    ws_send(&mut tx, &json!({"type": "play", "exp_id": exp_id})).await?;
    let (played, _) = ws_recv_until(&mut rx, response_to("play")).await?;
    assert_eq!(played["type"], "CommandExecutedSuccessfully");
    ws_recv_until(&mut rx, status("RUNNING")).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // While running, requests are serialized with the simulation thread.
    ws_send(&mut tx, &json!({"type": "evaluate", "exp_id": exp_id, "expr": "cycle > 0"})).await?;
    let (evaluated, _) = ws_recv_until(&mut rx, response_to("evaluate")).await?;
    assert_eq!(evaluated["content"], "true");

    ws_send(&mut tx, &json!({"type": "pause", "exp_id": exp_id})).await?;
    let (paused, _) = ws_recv_until(&mut rx, response_to("pause")).await?;
    assert_eq!(paused["type"], "CommandExecutedSuccessfully");

    ws_send(&mut tx, &json!({"type": "stop"})).await?;
    let (_, skipped) = ws_recv_until(&mut rx, response_to("stop")).await?;
    assert!(state.experiments.is_empty(), "frames: {skipped:?}");
    Ok(())
}

#[tokio::test]
async fn foreign_experiments_need_the_owner_socket_id() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("counter.gaml");
    std::fs::write(&model, SAMPLE_MODEL)?;

    let state = StateBuilder::new().build();
    let (addr, _handle) = spawn_ws_server(state.clone()).await?;
    let (mut owner_tx, mut owner_rx, owner_id) = ws_connect(&addr).await?;
    let (mut other_tx, mut other_rx, _) = ws_connect(&addr).await?;

    ws_send(
        &mut owner_tx,
        &json!({"type": "load", "model": model.display().to_string(), "experiment": "run"}),
    )
    .await?;
    let (loaded, seen) = ws_recv_until(&mut owner_rx, response_to("load")).await?;
    let exp_id = loaded["exp_id"].as_str().unwrap_or_default().to_owned();
    if !seen.iter().any(status("PAUSED")) {
        ws_recv_until(&mut owner_rx, status("PAUSED")).await?;
    }

    ws_send(&mut other_tx, &json!({"type": "step", "exp_id": exp_id, "sync": true})).await?;
    let resp = ws_recv(&mut other_rx, RECV_TIMEOUT).await?;
    assert_eq!(resp["type"], "UnableToExecuteRequest");

    ws_send(
        &mut other_tx,
        &json!({"type": "step", "exp_id": exp_id, "sync": true, "socket_id": owner_id}),
    )
    .await?;
    let resp = ws_recv(&mut other_rx, RECV_TIMEOUT).await?;
    assert_eq!(resp["type"], "CommandExecutedSuccessfully", "step: {resp}");
    // The response echoes the client's own socket_id.
    assert_eq!(resp["command"]["socket_id"], owner_id.as_str());
    // Pushes still go to the owner.
    let (inform, _) = ws_recv_until(&mut owner_rx, |f| f["type"] == "SimulationStatusInform").await?;
    assert_eq!(inform["content"], "Cycle 1");
    Ok(())
}

async fn count_pings(rx: &mut WsRx, window: Duration) -> usize {
    let deadline = Instant::now() + window;
    let mut pings = 0;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match tokio::time::timeout(left, rx.next()).await {
            Ok(Some(Ok(WsMessage::Ping(_)))) => pings += 1,
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(_)) | None) | Err(_) => break,
        }
    }
    pings
}

#[tokio::test]
async fn heartbeat_pings_on_the_interval() -> anyhow::Result<()> {
    let config = ServerConfig { ping_interval_ms: 100, ..ServerConfig::test() };
    let state = StateBuilder::new().config(config).build();
    let (addr, _handle) = spawn_ws_server(state).await?;
    let (_tx, mut rx, _) = ws_connect(&addr).await?;

    // The immediate first ping may have been skipped while reading the greeting.
    let pings = count_pings(&mut rx, Duration::from_millis(350)).await;
    assert!((2..=5).contains(&pings), "pings: {pings}");
    Ok(())
}

#[tokio::test]
async fn negative_interval_disables_heartbeat() -> anyhow::Result<()> {
    let state = StateBuilder::new().build();
    let (addr, _handle) = spawn_ws_server(state.clone()).await?;
    let (_tx, mut rx, _) = ws_connect(&addr).await?;

    assert_eq!(count_pings(&mut rx, Duration::from_millis(300)).await, 0);
    assert_eq!(state.connections.heartbeat_count(), 0);
    Ok(())
}

#[tokio::test]
async fn exit_answers_then_shuts_down() -> anyhow::Result<()> {
    let state = StateBuilder::new().build();
    let (addr, handle) = spawn_ws_server(state.clone()).await?;
    let (mut tx, mut rx, _) = ws_connect(&addr).await?;

    ws_send(&mut tx, &json!({"type": "exit"})).await?;
    let resp = ws_recv(&mut rx, RECV_TIMEOUT).await?;
    assert_eq!(resp["type"], "CommandExecutedSuccessfully");

    tokio::time::timeout(RECV_TIMEOUT, handle).await??;
    assert!(state.shutdown.is_cancelled());
    Ok(())
}
