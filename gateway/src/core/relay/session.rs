//! Relay session lifecycle.
//!
//! One task owns both sockets for the life of a session: it validates the
//! credential, dials the upstream, announces `upstream.open`, then pumps
//! frames in both directions until either side closes. Teardown runs exactly
//! once regardless of which side ends first; the atomic guard makes the
//! second path through it a no-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{self, CloseFrame, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tracing::{debug, info, warn};
use uuid::Uuid;

use verba_call::protocol::SidecarMessage;

use crate::core::relay::pump::{self, ClientFrame, UpstreamFrame};
use crate::core::relay::{KeepaliveSupervisor, upstream};
use crate::errors::RelayError;
use crate::state::AppState;

/// Buffer size for the upstream writer channel.
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Close code sent to the client when the relay aborts the session.
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Lifecycle of a relay session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Per-connection relay session.
pub struct ProxySession {
    pub id: Uuid,
    pub model: String,
    state: SessionState,
    closed: Arc<AtomicBool>,
}

impl ProxySession {
    pub fn new(model: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            model,
            state: SessionState::Connecting,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Advance the lifecycle. Backward transitions are ignored.
    pub fn advance(&mut self, next: SessionState) {
        if next > self.state {
            self.state = next;
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Claim teardown. Only the first caller gets `true`; everything
    /// destructive must sit behind that result.
    pub fn begin_teardown(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Run a relay session to completion. Consumes the client socket.
pub async fn run(socket: WebSocket, state: Arc<AppState>, model: String) {
    let mut session = ProxySession::new(model);
    let session_id = session.id;
    info!(%session_id, model = %session.model, "relay session starting");

    let (mut client_tx, mut client_rx) = socket.split();

    // Credential check happens before any upstream traffic.
    let Some(api_key) = state.config.openai_api_key.clone() else {
        warn!(%session_id, "no upstream credential configured, refusing session");
        close_client(
            &mut client_tx,
            CLOSE_INTERNAL_ERROR,
            RelayError::MissingApiKey.close_reason(),
        )
        .await;
        return;
    };

    let url = upstream::build_upstream_url(&state.config.realtime_upstream_url, &session.model);

    // Keep reading the client leg while the upstream handshake is in
    // flight. Frames arriving before the session is active are dropped,
    // never queued; a client close abandons the dial.
    let upstream_socket = match url {
        Ok(url) => {
            let connect = upstream::connect(&url, &api_key);
            tokio::pin!(connect);
            loop {
                select! {
                    result = &mut connect => break result,
                    client_msg = client_rx.next() => match client_msg {
                        Some(Ok(msg)) => match pump::classify_client(msg) {
                            ClientFrame::Forward(_) => {
                                warn!(%session_id, "client frame before upstream open, dropped");
                            }
                            ClientFrame::Close => {
                                info!(%session_id, "client closed while connecting, abandoning session");
                                return;
                            }
                            ClientFrame::Ignore => {}
                        },
                        Some(Err(e)) => {
                            warn!(%session_id, "client socket error while connecting: {e}");
                            return;
                        }
                        None => {
                            info!(%session_id, "client gone while connecting, abandoning session");
                            return;
                        }
                    },
                }
            }
        }
        Err(err) => Err(err),
    };

    let upstream_socket = match upstream_socket {
        Ok(socket) => socket,
        Err(err) => {
            warn!(%session_id, error = %err, "upstream setup failed");
            let _ = send_sidecar(
                &mut client_tx,
                &SidecarMessage::UpstreamError {
                    message: err.to_string(),
                },
            )
            .await;
            close_client(&mut client_tx, CLOSE_INTERNAL_ERROR, err.close_reason()).await;
            return;
        }
    };

    if send_sidecar(&mut client_tx, &SidecarMessage::UpstreamOpen)
        .await
        .is_err()
    {
        info!(%session_id, "client gone before upstream open, dropping session");
        return;
    }
    session.advance(SessionState::Active);

    let (mut upstream_sink, mut upstream_rx) = upstream_socket.split();

    // Single writer for the upstream sink; relayed frames and keepalive
    // pings both go through this channel.
    let (upstream_tx, mut writer_rx) = mpsc::channel::<tungstenite::Message>(CHANNEL_BUFFER_SIZE);
    let writer = tokio::spawn(async move {
        while let Some(msg) = writer_rx.recv().await {
            let is_close = matches!(msg, tungstenite::Message::Close(_));
            if let Err(e) = upstream_sink.send(msg).await {
                debug!("upstream write failed, writer ending: {e}");
                break;
            }
            if is_close {
                break;
            }
        }
    });

    let keepalive =
        KeepaliveSupervisor::spawn(state.config.keepalive_interval(), upstream_tx.clone());

    loop {
        select! {
            client_msg = client_rx.next() => match client_msg {
                Some(Ok(msg)) => match pump::classify_client(msg) {
                    ClientFrame::Forward(frame) => {
                        if upstream_tx.send(frame).await.is_err() {
                            warn!(%session_id, "upstream writer closed, dropping client frame");
                            break;
                        }
                    }
                    ClientFrame::Close => {
                        info!(%session_id, "client closed the session");
                        let _ = upstream_tx.send(tungstenite::Message::Close(None)).await;
                        break;
                    }
                    ClientFrame::Ignore => {}
                },
                Some(Err(e)) => {
                    warn!(%session_id, "client socket error: {e}");
                    let _ = upstream_tx.send(tungstenite::Message::Close(None)).await;
                    break;
                }
                None => {
                    info!(%session_id, "client stream ended");
                    let _ = upstream_tx.send(tungstenite::Message::Close(None)).await;
                    break;
                }
            },
            upstream_msg = upstream_rx.next() => match upstream_msg {
                Some(Ok(msg)) => match pump::classify_upstream(msg) {
                    UpstreamFrame::Forward(frame) => {
                        if client_tx.send(frame).await.is_err() {
                            warn!(%session_id, "client closed, dropping upstream frame");
                            break;
                        }
                    }
                    UpstreamFrame::Close { code, reason } => {
                        info!(%session_id, code, reason = %reason, "upstream closed the session");
                        let _ = send_sidecar(
                            &mut client_tx,
                            &SidecarMessage::UpstreamClose {
                                code,
                                reason: reason.clone(),
                            },
                        )
                        .await;
                        close_client(&mut client_tx, code, &reason).await;
                        break;
                    }
                    UpstreamFrame::Ignore => {}
                },
                Some(Err(e)) => {
                    warn!(%session_id, "upstream socket error: {e}");
                    let _ = send_sidecar(
                        &mut client_tx,
                        &SidecarMessage::UpstreamError { message: e.to_string() },
                    )
                    .await;
                    close_client(&mut client_tx, CLOSE_INTERNAL_ERROR, "upstream error").await;
                    break;
                }
                None => {
                    warn!(%session_id, "upstream stream ended without close frame");
                    let _ = send_sidecar(
                        &mut client_tx,
                        &SidecarMessage::UpstreamError {
                            message: "upstream connection lost".to_string(),
                        },
                    )
                    .await;
                    close_client(&mut client_tx, CLOSE_INTERNAL_ERROR, "upstream error").await;
                    break;
                }
            },
        }
    }

    session.advance(SessionState::Closing);
    if session.begin_teardown() {
        keepalive.cancel();
        drop(upstream_tx);
        let _ = writer.await;
        session.advance(SessionState::Closed);
        info!(%session_id, "relay session ended");
    }
}

/// Serialize and send a sidecar frame on the client leg.
async fn send_sidecar(
    client_tx: &mut SplitSink<WebSocket, ws::Message>,
    message: &SidecarMessage,
) -> Result<(), RelayError> {
    let json =
        serde_json::to_string(message).map_err(|e| RelayError::Internal(e.to_string()))?;
    client_tx
        .send(ws::Message::Text(json.into()))
        .await
        .map_err(|e| RelayError::WebSocket(e.to_string()))
}

/// Best-effort close of the client leg with a code and reason.
async fn close_client(client_tx: &mut SplitSink<WebSocket, ws::Message>, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    if let Err(e) = client_tx.send(ws::Message::Close(Some(frame))).await {
        debug!("client close frame not delivered: {e}");
    }
}
