//! Frame classification for the bidirectional relay pump.
//!
//! Both legs speak WebSocket but through different libraries: the client leg
//! is an axum socket, the upstream leg is tokio-tungstenite. These helpers
//! map frames across that boundary without touching the payload. Text and
//! binary payloads cross unchanged; control frames are handled per leg and
//! never forwarded.

use axum::extract::ws;
use tokio_tungstenite::tungstenite;

/// What to do with a frame read from the client socket.
#[derive(Debug)]
pub enum ClientFrame {
    /// Forward to the upstream as-is.
    Forward(tungstenite::Message),
    /// Client closed its side; tear the session down.
    Close,
    /// Transport-level frame consumed on this leg.
    Ignore,
}

/// What to do with a frame read from the upstream socket.
#[derive(Debug)]
pub enum UpstreamFrame {
    /// Forward to the client as-is.
    Forward(ws::Message),
    /// Upstream closed; code and reason are reported to the client verbatim.
    Close { code: u16, reason: String },
    /// Transport-level frame consumed on this leg.
    Ignore,
}

/// Close code reported when the peer closed without a status code. 1005 is
/// reserved and must never appear in a close frame on the wire, so an empty
/// upstream close is relayed as a normal closure.
const CLOSE_NORMAL: u16 = 1000;

/// Classify a frame arriving from the client.
pub fn classify_client(msg: ws::Message) -> ClientFrame {
    match msg {
        ws::Message::Text(text) => ClientFrame::Forward(tungstenite::Message::Text(
            text.as_str().to_string().into(),
        )),
        ws::Message::Binary(data) => ClientFrame::Forward(tungstenite::Message::Binary(data)),
        // axum answers pings itself; nothing to relay.
        ws::Message::Ping(_) | ws::Message::Pong(_) => ClientFrame::Ignore,
        ws::Message::Close(_) => ClientFrame::Close,
    }
}

/// Classify a frame arriving from the upstream.
pub fn classify_upstream(msg: tungstenite::Message) -> UpstreamFrame {
    match msg {
        tungstenite::Message::Text(text) => {
            UpstreamFrame::Forward(ws::Message::Text(text.as_str().to_string().into()))
        }
        tungstenite::Message::Binary(data) => {
            UpstreamFrame::Forward(ws::Message::Binary(data))
        }
        // tungstenite queues the pong reply on read; pongs acknowledge our
        // keepalive pings.
        tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => UpstreamFrame::Ignore,
        tungstenite::Message::Close(frame) => match frame {
            Some(frame) => UpstreamFrame::Close {
                code: frame.code.into(),
                reason: frame.reason.to_string(),
            },
            None => UpstreamFrame::Close {
                code: CLOSE_NORMAL,
                reason: String::new(),
            },
        },
        tungstenite::Message::Frame(_) => UpstreamFrame::Ignore,
    }
}
