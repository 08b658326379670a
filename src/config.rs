//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::ops::RangeInclusive;

use crate::chat::processor::DEFAULT_MAX_MESSAGE_LEN;

/// Largest accepted `ROOM_HISTORY_LIMIT`.
pub const MAX_ROOM_HISTORY_LIMIT: usize = 10_000;

/// Largest accepted `ROOM_CHANNEL_CAPACITY` and `EVENT_BUS_CAPACITY`.
pub const MAX_CHANNEL_CAPACITY: usize = 65_536;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Route of the WebSocket endpoint. Always starts with `/`.
    pub ws_path: String,

    /// Members per pool; `0` means unbounded pools.
    pub pool_capacity: usize,

    /// Maximum number of simultaneous pools; `0` means unlimited.
    pub max_pools: usize,

    /// Shared secret clients must present; verification is off when unset.
    pub auth_token: Option<String>,

    /// Messages kept per room for the `history` command.
    pub room_history_limit: usize,

    /// Capacity of each room's broadcast channel.
    pub room_channel_capacity: usize,

    /// Longest accepted chat message, in bytes.
    pub max_message_len: usize,

    /// Capacity of the directory EventBus broadcast channel.
    pub event_bus_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            ws_path: "/ws".to_string(),
            pool_capacity: 10,
            max_pools: 0,
            auth_token: None,
            room_history_limit: 50,
            room_channel_capacity: 256,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            event_bus_capacity: 1024,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to [`GatewayConfig::default`] values when a variable is
    /// missing or unparsable. Calls `dotenvy::dotenv().ok()` to optionally
    /// load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as a
    /// [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.listen_addr,
        };

        Ok(Self {
            listen_addr,
            ws_path: normalize_path(std::env::var("WS_PATH").ok(), &defaults.ws_path),
            pool_capacity: parse_env("POOL_CAPACITY", defaults.pool_capacity),
            max_pools: parse_env("MAX_POOLS", defaults.max_pools),
            auth_token: std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
            room_history_limit: clamp_setting(
                "ROOM_HISTORY_LIMIT",
                parse_env("ROOM_HISTORY_LIMIT", defaults.room_history_limit),
                0..=MAX_ROOM_HISTORY_LIMIT,
            ),
            room_channel_capacity: clamp_setting(
                "ROOM_CHANNEL_CAPACITY",
                parse_env("ROOM_CHANNEL_CAPACITY", defaults.room_channel_capacity),
                1..=MAX_CHANNEL_CAPACITY,
            ),
            max_message_len: parse_env("MAX_MESSAGE_LEN", defaults.max_message_len),
            event_bus_capacity: clamp_setting(
                "EVENT_BUS_CAPACITY",
                parse_env("EVENT_BUS_CAPACITY", defaults.event_bus_capacity),
                1..=MAX_CHANNEL_CAPACITY,
            ),
        })
    }
}

/// Pulls `value` into `range`, logging when it had to be adjusted.
fn clamp_setting(key: &str, value: usize, range: RangeInclusive<usize>) -> usize {
    let clamped = value.clamp(*range.start(), *range.end());
    if clamped != value {
        tracing::warn!(key, value, clamped, "setting out of range, clamped");
    }
    clamped
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Trims the configured route and makes sure it starts with `/`.
fn normalize_path(raw: Option<String>, default: &str) -> String {
    let trimmed = raw.as_deref().map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        default.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
