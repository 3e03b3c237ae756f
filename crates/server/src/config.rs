// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use crate::engine::Limits;

/// Remote control server for GAML simulations.
#[derive(Debug, Clone, Parser)]
#[command(name = "gama-server", version, about)]
pub struct ServerConfig {
    /// Address to bind.
    #[arg(long, env = "GAMA_SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// TCP port to listen on (0 picks a free one).
    #[arg(long, env = "GAMA_SERVER_PORT", default_value = "6868")]
    pub port: u16,

    /// Heartbeat ping interval in milliseconds. Negative disables pings.
    #[arg(
        long,
        env = "GAMA_SERVER_PING_INTERVAL_MS",
        default_value = "10000",
        allow_negative_numbers = true
    )]
    pub ping_interval_ms: i64,

    /// Log format (json or text).
    #[arg(long, env = "GAMA_SERVER_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level filter.
    #[arg(long, env = "GAMA_SERVER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Keep experiments alive when the connection that loaded them closes.
    #[arg(long, env = "GAMA_SERVER_DETACH_ON_CLOSE")]
    pub detach_on_close: bool,

    /// Command names to drop before dispatch (repeatable).
    #[arg(long = "deny-command", env = "GAMA_SERVER_DENY_COMMANDS", value_delimiter = ',')]
    pub deny_commands: Vec<String>,

    /// Minimum duration of a simulation cycle while running, in milliseconds.
    #[arg(long, env = "GAMA_SERVER_CYCLE_DELAY_MS", default_value = "0")]
    pub cycle_delay_ms: u64,

    /// Number of past cycles kept for `back`.
    #[arg(long, env = "GAMA_SERVER_HISTORY_DEPTH", default_value = "100")]
    pub history_depth: usize,

    /// Most agents one experiment may hold.
    #[arg(long, env = "GAMA_SERVER_MAX_AGENTS", default_value = "1000000")]
    pub max_agents: usize,
}

impl ServerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ping_interval_ms == 0 {
            anyhow::bail!("--ping-interval-ms must be positive, or negative to disable pings");
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format: {} (expected json or text)", self.log_format);
        }
        if self.host.trim().is_empty() {
            anyhow::bail!("--host must not be empty");
        }
        if self.max_agents == 0 {
            anyhow::bail!("--max-agents must be positive");
        }
        for name in &self.deny_commands {
            if crate::command::CommandKind::from_wire(name).is_none() {
                anyhow::bail!("--deny-command names an unknown command: {name}");
            }
        }
        Ok(())
    }

    /// The heartbeat period, or `None` when pings are disabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        u64::try_from(self.ping_interval_ms).ok().filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    pub fn world_limits(&self) -> Limits {
        Limits { history_depth: self.history_depth, max_agents: self.max_agents }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Create a minimal config for testing.
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ping_interval_ms: -1,
            log_format: "text".into(),
            log_level: "debug".into(),
            detach_on_close: false,
            deny_commands: vec![],
            cycle_delay_ms: 1,
            history_depth: 16,
            max_agents: 10_000,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
