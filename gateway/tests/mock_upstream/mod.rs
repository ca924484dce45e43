//! Mock upstream realtime WebSocket server.
//!
//! Stands in for the upstream realtime API in integration tests: records the
//! handshake URI and every frame it receives, and lets the test script
//! frames to send back through a control channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

pub struct MockUpstream {
    pub addr: SocketAddr,
    uris: Arc<Mutex<Vec<String>>>,
    protocols: Arc<Mutex<Vec<String>>>,
    frames: Arc<Mutex<Vec<Message>>>,
    connections: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    control: mpsc::Sender<Message>,
}

impl MockUpstream {
    pub async fn spawn() -> Self {
        Self::spawn_with_accept_delay(Duration::ZERO).await
    }

    /// Spawn a mock that sits on each TCP connection for `accept_delay`
    /// before answering the WebSocket handshake. Lets tests exercise the
    /// gateway while the upstream is still connecting.
    pub async fn spawn_with_accept_delay(accept_delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let uris: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let protocols: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let frames: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let (control, mut control_rx) = mpsc::channel::<Message>(64);

        {
            let uris = uris.clone();
            let protocols = protocols.clone();
            let frames = frames.clone();
            let connections = connections.clone();
            let disconnects = disconnects.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    connections.fetch_add(1, Ordering::SeqCst);
                    if !accept_delay.is_zero() {
                        tokio::time::sleep(accept_delay).await;
                    }

                    let uris = uris.clone();
                    let protocols = protocols.clone();
                    let callback = move |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                        uris.lock().unwrap().push(req.uri().to_string());
                        // RFC 6455 negotiation: a requested subprotocol must
                        // be echoed back or the client aborts the handshake.
                        if let Some(proto) = req.headers().get("Sec-WebSocket-Protocol") {
                            protocols
                                .lock()
                                .unwrap()
                                .push(proto.to_str().unwrap_or_default().to_string());
                            resp.headers_mut()
                                .insert("Sec-WebSocket-Protocol", proto.clone());
                        }
                        Ok(resp)
                    };
                    let Ok(ws) = accept_hdr_async(stream, callback).await else {
                        disconnects.fetch_add(1, Ordering::SeqCst);
                        continue;
                    };
                    let (mut write, mut read) = ws.split();

                    loop {
                        tokio::select! {
                            out = control_rx.recv() => match out {
                                Some(msg) => {
                                    let closing = matches!(msg, Message::Close(_));
                                    if write.send(msg).await.is_err() {
                                        break;
                                    }
                                    if closing {
                                        break;
                                    }
                                }
                                None => break,
                            },
                            incoming = read.next() => match incoming {
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(msg)) => frames.lock().unwrap().push(msg),
                                Some(Err(_)) => break,
                            },
                        }
                    }
                    disconnects.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        Self {
            addr,
            uris,
            protocols,
            frames,
            connections,
            disconnects,
            control,
        }
    }

    /// Base URL the gateway should dial.
    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    /// Script a frame for the connected client.
    pub async fn send(&self, msg: Message) {
        self.control.send(msg).await.unwrap();
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn request_uris(&self) -> Vec<String> {
        self.uris.lock().unwrap().clone()
    }

    /// Subprotocols requested (and echoed) during handshakes.
    pub fn negotiated_protocols(&self) -> Vec<String> {
        self.protocols.lock().unwrap().clone()
    }

    pub fn received(&self) -> Vec<Message> {
        self.frames.lock().unwrap().clone()
    }

    /// Wait until at least `count` frames have been recorded.
    pub async fn wait_for_received(&self, count: usize) -> Vec<Message> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let frames = self.received();
            if frames.len() >= count {
                return frames;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} frames, have {}",
                frames.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until a connection has ended.
    pub async fn wait_for_disconnect(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.disconnects.load(Ordering::SeqCst) == 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for disconnect"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
