//! Bridge configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

/// Default broadcast capacity of a logical socket's event subscription.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Errors raised while loading [`BridgeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `LISTEN_ADDR` is set but is not a valid socket address.
    #[error("invalid LISTEN_ADDR: {0}")]
    InvalidListenAddr(#[from] AddrParseError),
}

/// Top-level bridge configuration.
///
/// Loaded once at startup via [`BridgeConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Capacity of each logical socket's broadcast subscription.
    pub event_capacity: usize,

    /// Largest accepted WebSocket message, in bytes.
    pub max_message_size: usize,

    /// Largest accepted WebSocket frame, in bytes.
    pub max_frame_size: usize,

    /// Subprotocols the server is willing to speak, in preference order.
    pub protocols: Vec<String>,

    /// Upper bound on a single render in the demo router (`None` disables).
    pub render_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_message_size: 64 << 20,
            max_frame_size: 16 << 20,
            protocols: Vec::new(),
            render_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl BridgeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to [`BridgeConfig::default`] values when a variable is
    /// not set. Calls `dotenvy::dotenv().ok()` to optionally load a `.env`
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidListenAddr`] if `LISTEN_ADDR` is set
    /// but cannot be parsed as a [`SocketAddr`].
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.listen_addr,
        };

        let event_capacity = parse_env("SOCKET_EVENT_CAPACITY", defaults.event_capacity).max(1);
        let max_message_size = parse_env("WS_MAX_MESSAGE_SIZE", defaults.max_message_size);
        let max_frame_size = parse_env("WS_MAX_FRAME_SIZE", defaults.max_frame_size);
        let protocols = std::env::var("WS_PROTOCOLS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_default();
        let render_timeout = match parse_env("RENDER_TIMEOUT_SECS", 30u64) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            listen_addr,
            event_capacity,
            max_message_size,
            max_frame_size,
            protocols,
            render_timeout,
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Splits a comma separated list, dropping empty entries.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BridgeConfig::default();
        assert_eq!(config.listen_addr.port(), 3000);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.protocols.is_empty());
        assert_eq!(config.render_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn parse_list_trims_and_skips_empty() {
        assert_eq!(
            parse_list(" chat, ,superchat ,"),
            vec!["chat".to_string(), "superchat".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn parse_env_falls_back_on_missing_key() {
        assert_eq!(parse_env("UPGRADE_BRIDGE_TEST_UNSET_KEY", 7usize), 7);
    }
}
