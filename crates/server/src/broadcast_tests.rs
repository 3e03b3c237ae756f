// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::{Gates, Messenger, Push, ServerConfiguration};
use crate::engine::Emission;
use crate::experiment::ExperimentState;
use crate::test_support::drain_json;
use crate::transport::connection::ConnectionHandle;

#[test]
fn pushes_reach_the_owner() -> anyhow::Result<()> {
    let messenger = Messenger::new();
    let (conn, mut rx) = ConnectionHandle::channel();
    messenger.register(ServerConfiguration::new("1", conn, Gates::default()));

    assert!(messenger.send("1", Push::Output("hello".into())));
    assert!(messenger.send("1", Push::Status(ExperimentState::Running)));
    assert_eq!(
        drain_json(&mut rx)?,
        vec![
            json!({"type": "SimulationOutput", "content": "hello", "exp_id": "1"}),
            json!({"type": "SimulationStatus", "content": "RUNNING", "exp_id": "1"}),
        ]
    );
    Ok(())
}

#[yare::parameterized(
    console_output = { Gates { console: false, ..Gates::default() }, Push::Output("x".into()) },
    console_debug = { Gates { console: false, ..Gates::default() }, Push::Debug("x".into()) },
    dialog = { Gates { dialog: false, ..Gates::default() }, Push::Dialog("x".into()) },
    status = { Gates { status: false, ..Gates::default() }, Push::StatusInform("x".into()) },
    status_error = { Gates { status: false, ..Gates::default() }, Push::StatusError("x".into()) },
    runtime = { Gates { runtime: false, ..Gates::default() }, Push::RuntimeError("x".into()) },
)]
fn closed_gates_drop_pushes(gates: Gates, push: Push) {
    let messenger = Messenger::new();
    let (conn, mut rx) = ConnectionHandle::channel();
    messenger.register(ServerConfiguration::new("1", conn, gates));
    assert!(!messenger.send("1", push));
    assert!(rx.try_recv().is_err());
}

#[test]
fn status_ignores_gates() {
    let closed = Gates { console: false, status: false, dialog: false, runtime: false };
    assert!(Push::Status(ExperimentState::Paused).allowed_by(&closed));
    assert!(Push::Ended { cycle: 3 }.allowed_by(&closed));
}

#[test]
fn unknown_or_detached_experiments_drop_silently() {
    let messenger = Messenger::new();
    assert!(!messenger.send("404", Push::Output("x".into())));

    let (conn, _rx) = ConnectionHandle::channel();
    messenger.register(ServerConfiguration::new("1", conn.clone(), Gates::default()));
    assert_eq!(messenger.detach(conn.id()), vec!["1".to_owned()]);
    assert!(!messenger.send("1", Push::Output("x".into())));
    assert!(messenger.owned_by(conn.id()).is_empty());
}

#[test]
fn reattach_routes_to_new_connection() -> anyhow::Result<()> {
    let messenger = Messenger::new();
    let (first, _rx1) = ConnectionHandle::channel();
    let (second, mut rx2) = ConnectionHandle::channel();
    messenger.register(ServerConfiguration::new("7", first.clone(), Gates::default()));
    messenger.reattach("7", &second);

    assert_eq!(messenger.owned_by(second.id()), vec!["7".to_owned()]);
    messenger.flush("7", vec![Emission::Tell("hi".into())]);
    assert_eq!(
        drain_json(&mut rx2)?,
        vec![json!({"type": "SimulationDialog", "content": "hi", "exp_id": "7"})]
    );
    Ok(())
}

#[test]
fn closed_owner_drops_pushes() {
    let messenger = Messenger::new();
    let (conn, _rx) = ConnectionHandle::channel();
    messenger.register(ServerConfiguration::new("1", conn.clone(), Gates::default()));
    conn.mark_closed();
    assert!(!messenger.send("1", Push::Status(ExperimentState::Paused)));
}
