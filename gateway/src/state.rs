//! Shared application state.

use crate::config::ServerConfig;

/// State shared across all handlers, wrapped in an `Arc` by the router.
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }
}
