mod handler;

pub use handler::{RealtimeQuery, realtime_ws_handler};
