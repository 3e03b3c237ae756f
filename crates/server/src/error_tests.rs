// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    connected = { MessageType::ConnectionSuccessful },
    success = { MessageType::CommandExecutedSuccessfully },
    malformed = { MessageType::MalformedRequest },
    unable = { MessageType::UnableToExecuteRequest },
    server = { MessageType::GamaServerError },
    runtime = { MessageType::RuntimeError },
    status = { MessageType::SimulationStatus },
    output = { MessageType::SimulationOutput },
    debug = { MessageType::SimulationDebug },
    dialog = { MessageType::SimulationDialog },
    inform = { MessageType::SimulationStatusInform },
    status_error = { MessageType::SimulationStatusError },
    ended = { MessageType::SimulationEnded },
)]
fn serializes_as_its_wire_name(kind: MessageType) {
    let json = serde_json::to_value(kind).ok();
    assert_eq!(json, Some(serde_json::Value::String(kind.as_str().to_owned())));
    assert_eq!(kind.to_string(), kind.as_str());
}

#[test]
fn only_three_failure_kinds() {
    let failures = [
        MessageType::MalformedRequest,
        MessageType::UnableToExecuteRequest,
        MessageType::GamaServerError,
    ];
    assert!(failures.iter().all(MessageType::is_command_failure));
    assert!(!MessageType::RuntimeError.is_command_failure());
    assert!(!MessageType::CommandExecutedSuccessfully.is_command_failure());
}

#[test]
fn constructors_pick_the_envelope() {
    assert_eq!(CommandError::malformed("x").kind, MessageType::MalformedRequest);
    assert_eq!(CommandError::unable("x").kind, MessageType::UnableToExecuteRequest);
    assert_eq!(CommandError::server("x").kind, MessageType::GamaServerError);
    assert_eq!(CommandError::unable("Controller is full").to_string(), "UnableToExecuteRequest: Controller is full");
}
