//! Configuration for the relay.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api-v2-sandbox.p2pquake.net/v2/history";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}: invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub ws_path: String,
    pub upstream_url: String,
    pub upstream_limit: u32,
    pub upstream_timeout: Duration,
    pub broadcast_interval: Duration,
    /// Frames queued per subscriber before it is considered too slow and evicted.
    pub outbox_capacity: usize,
    /// Keepalive ping period; `None` disables pings.
    pub ping_interval: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 8080u16)?;
        let mut ws_path = lookup("WS_PATH").unwrap_or_else(|| "/ws".to_string());
        if !ws_path.starts_with('/') {
            ws_path.insert(0, '/');
        }
        if !is_literal_route(&ws_path) {
            return Err(ConfigError::Invalid {
                name: "WS_PATH",
                value: ws_path,
            });
        }
        let upstream_url =
            lookup("UPSTREAM_URL").unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());
        let upstream_limit =
            nonzero(parse_or(&lookup, "UPSTREAM_LIMIT", 100u32)?, "UPSTREAM_LIMIT")?;
        let upstream_timeout = Duration::from_secs(nonzero(
            parse_or(&lookup, "UPSTREAM_TIMEOUT_SECS", 30u64)?,
            "UPSTREAM_TIMEOUT_SECS",
        )?);
        let broadcast_interval = Duration::from_secs(nonzero(
            parse_or(&lookup, "BROADCAST_INTERVAL_SECS", 30u64)?,
            "BROADCAST_INTERVAL_SECS",
        )?);
        let outbox_capacity = nonzero(
            parse_or(&lookup, "WS_OUTBOX_CAPACITY", 16usize)?,
            "WS_OUTBOX_CAPACITY",
        )?;
        let ping_interval = match parse_or(&lookup, "WS_PING_INTERVAL_SECS", 30u64)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            host,
            port,
            ws_path,
            upstream_url,
            upstream_limit,
            upstream_timeout,
            broadcast_interval,
            outbox_capacity,
            ping_interval,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loopback config with a short cadence and no pings.
    pub fn for_test(upstream_url: &str, broadcast_interval: Duration) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            ws_path: "/ws".to_string(),
            upstream_url: upstream_url.to_string(),
            upstream_limit: 100,
            upstream_timeout: Duration::from_secs(5),
            broadcast_interval,
            outbox_capacity: 16,
            ping_interval: None,
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

/// A plain path the router can mount: no captures, wildcards, query or fragment.
fn is_literal_route(path: &str) -> bool {
    !path.contains(['{', '}', '?', '#'])
        && !path.chars().any(char::is_whitespace)
        && path
            .split('/')
            .all(|segment| !segment.starts_with(':') && !segment.starts_with('*'))
}

fn nonzero<T: Default + PartialEq>(value: T, name: &'static str) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Zero { name });
    }
    Ok(value)
}
