//! Transparent WebSocket relay between browser clients and the upstream
//! realtime API.
//!
//! The relay tunnels frames byte-for-byte in both directions. It injects the
//! upstream credential during the handshake, keeps the upstream connection
//! alive with periodic pings, and reports upstream lifecycle transitions to
//! the client through sidecar frames ([`verba_call::protocol::SidecarMessage`]).

pub mod keepalive;
pub mod pump;
pub mod session;
pub mod upstream;

pub use keepalive::KeepaliveSupervisor;
pub use session::{ProxySession, SessionState};
