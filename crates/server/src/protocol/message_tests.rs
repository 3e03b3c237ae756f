// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use crate::error::MessageType;
use crate::protocol::decode;

#[test]
fn injected_fields_are_not_echoed() -> anyhow::Result<()> {
    let mut msg = decode(r#"{"type":"play","exp_id":"3"}"#)?;
    msg.inject("socket_id", "17");
    assert_eq!(msg.socket_id().as_deref(), Some("17"));
    assert_eq!(msg.echo(), json!({"type": "play", "exp_id": "3"}));
    Ok(())
}

#[test]
fn client_fields_win_over_injection() -> anyhow::Result<()> {
    let mut msg = decode(r#"{"type":"play","socket_id":"9"}"#)?;
    msg.inject("socket_id", "17");
    assert_eq!(msg.socket_id().as_deref(), Some("9"));
    assert_eq!(msg.echo(), json!({"type": "play", "socket_id": "9"}));
    Ok(())
}

#[test]
fn echo_preserves_field_order() -> anyhow::Result<()> {
    let msg = decode(r#"{"zeta":1,"type":"step","alpha":2}"#)?;
    let keys: Vec<String> = msg.echo().as_object().map(|o| o.keys().cloned().collect()).unwrap_or_default();
    assert_eq!(keys, vec!["zeta", "type", "alpha"]);
    Ok(())
}

#[test]
fn numeric_exp_id_is_accepted() -> anyhow::Result<()> {
    let msg = decode(r#"{"type":"pause","exp_id":4}"#)?;
    assert_eq!(msg.exp_id().as_deref(), Some("4"));
    let blank = decode(r#"{"type":"pause","exp_id":"  "}"#)?;
    assert_eq!(blank.exp_id(), None);
    Ok(())
}

#[yare::parameterized(
    absent = { r#"{}"#, Some(false) },
    boolean = { r#"{"sync":true}"#, Some(true) },
    string = { r#"{"sync":"TRUE"}"#, Some(true) },
    null = { r#"{"sync":null}"#, Some(false) },
    number = { r#"{"sync":1}"#, None },
)]
fn flags(raw: &str, expected: Option<bool>) {
    let msg = decode(raw).expect("valid json");
    match expected {
        Some(value) => assert_eq!(msg.flag("sync", false).ok(), Some(value)),
        None => assert_eq!(
            msg.flag("sync", false).err().map(|e| e.kind),
            Some(MessageType::MalformedRequest)
        ),
    }
}

#[yare::parameterized(
    absent = { r#"{}"#, Some(None) },
    number = { r#"{"nb_step":3}"#, Some(Some(3)) },
    string = { r#"{"nb_step":" 12 "}"#, Some(Some(12)) },
    fraction = { r#"{"nb_step":1.5}"#, None },
    word = { r#"{"nb_step":"many"}"#, None },
)]
fn integers(raw: &str, expected: Option<Option<i64>>) {
    let msg = decode(raw).expect("valid json");
    match expected {
        Some(value) => assert_eq!(msg.integer("nb_step").ok(), Some(value)),
        None => assert!(msg.integer("nb_step").is_err()),
    }
}
