//! Upstream keepalive supervisor.
//!
//! Long voice calls can sit silent past intermediary idle timeouts, so a
//! dedicated task pings the upstream on a fixed cadence for the whole life of
//! the session. Pings go through the same writer channel as relayed frames,
//! keeping the upstream sink single-writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

/// Owns the periodic ping task for one session.
///
/// `cancel` is idempotent: the first call stops the task, later calls are
/// no-ops. Dropping the supervisor cancels it as well, so a session that
/// unwinds early cannot leak the ping task.
pub struct KeepaliveSupervisor {
    task: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

impl KeepaliveSupervisor {
    /// Spawn the ping loop writing into the upstream writer channel.
    pub fn spawn(interval: Duration, sink: mpsc::Sender<Message>) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately; skip it so pings start one
            // interval after connect.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    debug!("upstream writer gone, keepalive loop ending");
                    break;
                }
                trace!("keepalive ping sent");
            }
        });
        Self { task, cancelled }
    }

    /// Stop the ping loop. Returns true only for the call that actually
    /// performed the cancellation.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.task.abort();
        debug!("keepalive supervisor cancelled");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for KeepaliveSupervisor {
    fn drop(&mut self) {
        self.cancel();
    }
}
