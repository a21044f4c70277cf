//! Client configuration from environment variables.

use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::storage::ClientSettings;

/// Production match server.
pub const PRODUCTION_URL: &str = "wss://api.pawn-hub.de";
/// Development server started next to the client.
pub const LOCAL_URL: &str = "ws://localhost:3000";
/// How long a dropped client may try to resume before the session is closed.
pub const DEFAULT_RECONNECT_GRACE: Duration = Duration::from_secs(20);
/// Longest a single connection attempt (TCP, TLS and WebSocket handshake) may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Use `local_url` instead of `server_url`.
    pub debug_local_server: bool,
    pub server_url: String,
    pub local_url: String,
    pub reconnect_grace: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            debug_local_server: false,
            server_url: PRODUCTION_URL.to_string(),
            local_url: LOCAL_URL.to_string(),
            reconnect_grace: DEFAULT_RECONNECT_GRACE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Build the configuration from the process environment and the
    /// persisted settings.
    ///
    /// Environment variables:
    /// - `PAWNHUB_DEBUG_LOCAL_SERVER`: "1" | "true" | "yes" | "on" selects the
    ///   local server (default: persisted setting, else off)
    /// - `PAWNHUB_SERVER_URL`: production endpoint (default: `wss://api.pawn-hub.de`)
    /// - `PAWNHUB_LOCAL_URL`: local endpoint (default: `ws://localhost:3000`)
    /// - `PAWNHUB_RECONNECT_GRACE_SECS`: resume grace period (default: 20)
    /// - `PAWNHUB_CONNECT_TIMEOUT_SECS`: limit for one connection attempt (default: 10)
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok(), ClientSettings::load())
    }

    /// Same as [`ClientConfig::from_env`] with an explicit variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>, settings: ClientSettings) -> Self {
        let mut config = Self {
            debug_local_server: settings.debug_local_server,
            ..Self::default()
        };

        if let Some(flag) = lookup("PAWNHUB_DEBUG_LOCAL_SERVER") {
            config.debug_local_server = matches!(
                flag.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Some(url) = lookup("PAWNHUB_SERVER_URL").and_then(|v| validated_url("PAWNHUB_SERVER_URL", v)) {
            config.server_url = url;
        }

        if let Some(url) = lookup("PAWNHUB_LOCAL_URL").and_then(|v| validated_url("PAWNHUB_LOCAL_URL", v)) {
            config.local_url = url;
        }

        if let Some(grace) = seconds_var(&lookup, "PAWNHUB_RECONNECT_GRACE_SECS") {
            config.reconnect_grace = grace;
        }

        match seconds_var(&lookup, "PAWNHUB_CONNECT_TIMEOUT_SECS") {
            Some(limit) if limit.is_zero() => {
                warn!("Ignoring PAWNHUB_CONNECT_TIMEOUT_SECS: must be at least 1");
            }
            Some(limit) => config.connect_timeout = limit,
            None => {}
        }

        config
    }

    /// The endpoint selected by the debug flag.
    pub fn endpoint(&self) -> &str {
        if self.debug_local_server {
            &self.local_url
        } else {
            &self.server_url
        }
    }
}

fn seconds_var(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<Duration> {
    let value = lookup(var)?;
    match value.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(e) => {
            warn!(%var, value = %value, "Ignoring non-numeric seconds: {}", e);
            None
        }
    }
}

/// Accept only ws:// and wss:// URLs.
fn validated_url(var: &str, value: String) -> Option<String> {
    match Url::parse(value.trim()) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => Some(value.trim().to_string()),
        Ok(url) => {
            warn!(%var, scheme = url.scheme(), "Ignoring endpoint with non-websocket scheme");
            None
        }
        Err(e) => {
            warn!(%var, value = %value, "Ignoring invalid endpoint: {}", e);
            None
        }
    }
}
