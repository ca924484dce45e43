//! Session persistence collaborator.
//!
//! Persisting the call record and its transcriptions is best-effort: the
//! orchestrator fires these calls on detached tasks and logs failures without
//! ever feeding them into the call's error state. Implementations are
//! injected per call instance rather than referenced as process-wide
//! singletons.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::transcript::Role;

/// Persistence interface for voice-call session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session record and return its identifier.
    async fn create_session(&self) -> Result<String, StoreError>;

    /// Append one transcription line to a session.
    async fn save_transcription(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError>;

    /// Mark a session as ended.
    async fn end_session(&self, session_id: &str) -> Result<(), StoreError>;
}

/// Store that discards everything. Useful when the backend is unavailable or
/// persistence is disabled; the call must work identically either way.
#[derive(Debug, Default)]
pub struct NoopSessionStore;

#[async_trait]
impl SessionStore for NoopSessionStore {
    async fn create_session(&self) -> Result<String, StoreError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn save_transcription(
        &self,
        _session_id: &str,
        _role: Role,
        _content: &str,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn end_session(&self, _session_id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A persisted transcription line.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTranscription {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    sessions: HashMap<String, Vec<StoredTranscription>>,
    ended: Vec<String>,
}

/// In-memory store, owned by whoever injects it. Primarily for tests and
/// local development.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcriptions saved for a session, in order.
    pub fn transcriptions(&self, session_id: &str) -> Vec<StoredTranscription> {
        self.inner
            .lock()
            .sessions
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether `end_session` was called for this id.
    pub fn is_ended(&self, session_id: &str) -> bool {
        self.inner.lock().ended.iter().any(|id| id == session_id)
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.inner.lock().sessions.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn save_transcription(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let lines = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError(format!("unknown session: {session_id}")))?;
        lines.push(StoredTranscription {
            role,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.inner.lock().ended.push(session_id.to_string());
        Ok(())
    }
}
