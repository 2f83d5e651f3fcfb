// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-driven process configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: String, value: String },
    #[error("port ranges overlap: desktop {desktop:?} vs tool {tool:?}")]
    OverlappingRanges {
        desktop: (u16, u16),
        tool: (u16, u16),
    },
}

/// Process role, selected by `MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Api,
    Worker,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(Mode::Api),
            "worker" => Ok(Mode::Worker),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Api => write!(f, "api"),
            Mode::Worker => write!(f, "worker"),
        }
    }
}

/// Log output format, selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Inclusive TCP port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub lo: u16,
    pub hi: u16,
}

impl PortRange {
    pub fn new(lo: u16, hi: u16) -> Self {
        Self { lo, hi }
    }

    pub fn len(&self) -> usize {
        (self.hi as usize).saturating_sub(self.lo as usize) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.hi < self.lo
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.lo && port <= self.hi
    }

    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.lo <= other.hi && other.lo <= self.hi
    }
}

/// Full process configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub api_host: String,
    pub api_port: u16,
    pub store_host: String,
    pub store_port: u16,
    pub store_password: Option<String>,
    pub worker_concurrency: usize,
    pub max_sessions_per_worker: usize,
    /// Session TTL; also the TTL of all derived streams
    pub session_timeout: Duration,
    pub desktop_ports: PortRange,
    pub tool_ports: PortRange,
    pub container_memory_limit: String,
    /// CPU share weight handed to the container runtime
    pub container_cpu_shares: u32,
    pub container_network: Option<String>,
    pub agent_image: String,
    /// Host directory under which per-session workspaces are bind-mounted
    pub session_data_root: PathBuf,
    pub cors_origins: Vec<String>,
    /// Upper bound on concurrently served HTTP requests
    pub max_concurrent_requests: usize,
    pub log_level: String,
    pub log_format: LogFormat,
    // Plane timing knobs (defaults per the orchestration contracts)
    pub port_lease: Duration,
    pub reclaim_interval: Duration,
    pub stalled_interval: Duration,
    pub max_stalled: u32,
    pub sandbox_stale_age: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let desktop_ports = PortRange::new(
            parse_env("DESKTOP_PORT_RANGE_START", 6080)?,
            parse_env("DESKTOP_PORT_RANGE_END", 6200)?,
        );
        let tool_ports = PortRange::new(
            parse_env("TOOL_PORT_RANGE_START", 8080)?,
            parse_env("TOOL_PORT_RANGE_END", 8200)?,
        );
        if desktop_ports.overlaps(&tool_ports) {
            return Err(ConfigError::OverlappingRanges {
                desktop: (desktop_ports.lo, desktop_ports.hi),
                tool: (tool_ports.lo, tool_ports.hi),
            });
        }

        Ok(Self {
            mode: parse_env_str("MODE", Mode::Api)?,
            api_host: env_or("API_HOST", "0.0.0.0"),
            api_port: parse_env("API_PORT", 3000)?,
            store_host: env_or("STORE_HOST", "127.0.0.1"),
            store_port: parse_env("STORE_PORT", 6379)?,
            store_password: std::env::var("STORE_PASSWORD").ok().filter(|s| !s.is_empty()),
            worker_concurrency: parse_env("WORKER_CONCURRENCY", 2)?,
            max_sessions_per_worker: parse_env("MAX_SESSIONS_PER_WORKER", 10)?,
            session_timeout: Duration::from_secs(parse_env("SESSION_TIMEOUT", 3600)?),
            desktop_ports,
            tool_ports,
            container_memory_limit: env_or("CONTAINER_MEMORY_LIMIT", "2g"),
            container_cpu_shares: parse_env("CONTAINER_CPU_LIMIT", 1024)?,
            container_network: std::env::var("CONTAINER_NETWORK").ok().filter(|s| !s.is_empty()),
            agent_image: env_or("AGENT_IMAGE", "ottobot-sandbox:latest"),
            session_data_root: PathBuf::from(env_or("SESSION_DATA_ROOT", "/srv/ottobot")),
            cors_origins: env_or("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_concurrent_requests: parse_env("MAX_CONCURRENT_REQUESTS", 256)?,
            log_level: env_or("LOG_LEVEL", "info"),
            log_format: match env_or("LOG_FORMAT", "pretty").as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            port_lease: Duration::from_secs(parse_env("PORT_LEASE_SECS", 7200)?),
            reclaim_interval: Duration::from_secs(parse_env("RECLAIM_INTERVAL_SECS", 60)?),
            stalled_interval: Duration::from_secs(parse_env("STALLED_INTERVAL_SECS", 30)?),
            max_stalled: parse_env("MAX_STALLED", 3)?,
            sandbox_stale_age: Duration::from_secs(parse_env("SANDBOX_STALE_AGE_SECS", 7200)?),
        })
    }

    /// Host clients use to reach session URLs; the bind-all address is not
    /// routable from a browser.
    pub fn public_host(&self) -> &str {
        if self.api_host == "0.0.0.0" || self.api_host == "::" {
            "localhost"
        } else {
            &self.api_host
        }
    }

    /// Redis-style connection URL for the coordination store.
    pub fn store_url(&self) -> String {
        match &self.store_password {
            Some(pw) => format!("redis://:{}@{}:{}/", pw, self.store_host, self.store_port),
            None => format!("redis://{}:{}/", self.store_host, self.store_port),
        }
    }

    /// Memory limit in bytes (accepts `512m`, `2g`, or plain bytes).
    pub fn memory_limit_bytes(&self) -> i64 {
        parse_memory(&self.container_memory_limit).unwrap_or(2 * 1024 * 1024 * 1024)
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T: FromStr + Copy>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => raw.parse().map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            value: raw,
        }),
        _ => Ok(default),
    }
}

fn parse_env_str<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => raw.parse().map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            value: raw,
        }),
        _ => Ok(default),
    }
}

fn parse_memory(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(bytes) = trimmed.parse::<i64>() {
        return Some(bytes);
    }
    let (num, suffix) = trimmed.split_at(trimmed.len().checked_sub(1)?);
    let base: i64 = num.parse().ok()?;
    match suffix {
        "k" | "K" => Some(base * 1024),
        "m" | "M" => Some(base * 1024 * 1024),
        "g" | "G" => Some(base * 1024 * 1024 * 1024),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
