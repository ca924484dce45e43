//! Error types for the relay gateway.

use thiserror::Error;

/// Errors raised while establishing or running a relay session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No upstream credential is configured. Detected before any upstream
    /// traffic; the client socket is closed without touching the upstream.
    #[error("no upstream API key configured")]
    MissingApiKey,

    /// The configured upstream URL could not be parsed.
    #[error("invalid upstream URL: {0}")]
    InvalidUpstreamUrl(#[from] url::ParseError),

    /// The upstream WebSocket connection could not be established.
    #[error("upstream connect failed: {0}")]
    UpstreamConnect(String),

    /// A WebSocket transport failure on either leg of the relay.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Internal failure while preparing the relay.
    #[error("internal relay error: {0}")]
    Internal(String),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Reason string carried on the 1011 close frame sent to the client when
    /// this error aborts session setup.
    pub fn close_reason(&self) -> &'static str {
        match self {
            RelayError::MissingApiKey => "missing api key",
            RelayError::UpstreamConnect(_) | RelayError::WebSocket(_) => "upstream error",
            RelayError::InvalidUpstreamUrl(_) | RelayError::Internal(_) => "proxy init error",
        }
    }
}
