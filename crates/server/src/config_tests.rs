// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use super::ServerConfig;

fn parse(args: &[&str]) -> ServerConfig {
    ServerConfig::parse_from(args)
}

#[test]
fn defaults_are_valid() -> anyhow::Result<()> {
    let config = parse(&["gama-server"]);
    config.validate()?;
    assert_eq!(config.port, 6868);
    assert_eq!(config.ping_interval(), Some(Duration::from_secs(10)));
    assert_eq!(config.cycle_delay(), Duration::ZERO);
    assert_eq!(config.history_depth, 100);
    assert_eq!(config.world_limits().max_agents, 1_000_000);
    assert!(!config.detach_on_close);
    assert_eq!(config.bind_addr(), "127.0.0.1:6868");
    Ok(())
}

#[test]
fn negative_interval_disables_pings() -> anyhow::Result<()> {
    let config = parse(&["gama-server", "--ping-interval-ms", "-1"]);
    config.validate()?;
    assert_eq!(config.ping_interval(), None);
    Ok(())
}

#[test]
fn deny_commands_accept_lists() -> anyhow::Result<()> {
    let config = parse(&["gama-server", "--deny-command", "exit,upload", "--deny-command", "download"]);
    config.validate()?;
    assert_eq!(config.deny_commands, vec!["exit", "upload", "download"]);
    Ok(())
}

#[yare::parameterized(
    zero_interval = { &["gama-server", "--ping-interval-ms", "0"], "must be positive" },
    bad_format    = { &["gama-server", "--log-format", "yaml"], "invalid log format" },
    empty_host    = { &["gama-server", "--host", " "], "--host" },
    unknown_deny  = { &["gama-server", "--deny-command", "launch"], "unknown command: launch" },
    zero_agents   = { &["gama-server", "--max-agents", "0"], "--max-agents" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[test]
fn test_config_is_valid() -> anyhow::Result<()> {
    ServerConfig::test().validate()
}
