//! Configuration for the relay gateway.
//!
//! Configuration is loaded from environment variables, with a `.env` file
//! picked up by the binary before loading. Every setting has a default except
//! the upstream API key, whose absence is surfaced per session rather than at
//! startup so the server can come up and report the problem on the socket.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroize;

/// Default bind host.
const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port.
const DEFAULT_PORT: u16 = 3001;

/// Default upstream realtime endpoint.
const DEFAULT_UPSTREAM_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default model requested when the client does not pick one.
const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";

/// Default interval between keepalive pings on the upstream leg (seconds).
const DEFAULT_KEEPALIVE_SECS: u64 = 20;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("TLS requires both TLS_CERT_PATH and TLS_KEY_PATH")]
    IncompleteTls,
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the relay gateway: bind address, TLS,
/// the upstream realtime endpoint and credential, keepalive cadence, and
/// CORS policy.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// API key injected into the upstream handshake. Never forwarded to or
    /// accepted from clients.
    pub openai_api_key: Option<String>,

    /// Base URL of the upstream realtime WebSocket endpoint.
    pub realtime_upstream_url: String,

    /// Model used when the client omits the `model` query parameter.
    pub realtime_default_model: String,

    /// Seconds between keepalive pings sent on the upstream connection.
    pub keepalive_interval_secs: u64,

    /// CORS allowed origins (comma-separated list or "*" for all).
    /// Default: None (same-origin only)
    pub cors_allowed_origins: Option<String>,
}

/// Zeroize the upstream credential when the config is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            openai_api_key: None,
            realtime_upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            realtime_default_model: DEFAULT_MODEL.to_string(),
            keepalive_interval_secs: DEFAULT_KEEPALIVE_SECS,
            cors_allowed_origins: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through a lookup function. Separated from
    /// `from_env` so tests do not have to mutate process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "PORT".to_string(),
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let keepalive_interval_secs = match lookup("REALTIME_KEEPALIVE_SECS") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "REALTIME_KEEPALIVE_SECS".to_string(),
                value: raw,
            })?,
            None => DEFAULT_KEEPALIVE_SECS,
        };

        let tls = match (lookup("TLS_CERT_PATH"), lookup("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        Ok(Self {
            host,
            port,
            tls,
            openai_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()),
            realtime_upstream_url: lookup("REALTIME_UPSTREAM_URL")
                .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
            realtime_default_model: lookup("REALTIME_DEFAULT_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            keepalive_interval_secs,
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS"),
        })
    }

    /// Bind address as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the server should terminate TLS itself.
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Keepalive cadence as a [`Duration`].
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}
