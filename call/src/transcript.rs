//! Transcript accumulation for a voice call.
//!
//! Assistant text arrives as streaming deltas; they are folded into the last
//! assistant entry until the turn completes. Completed user transcriptions
//! always open a fresh entry.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Role of the speaker in a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry in the call transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
    /// Unix timestamp in milliseconds, taken when the entry was created.
    pub timestamp_ms: u64,
}

/// Ordered transcript with streaming accumulation into the open assistant
/// turn.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    messages: Vec<TranscriptMessage>,
    /// Whether the last assistant entry is still accepting deltas.
    assistant_open: bool,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a streaming assistant delta. Folds into the open assistant
    /// entry; otherwise starts a new one.
    pub fn push_assistant_delta(&mut self, delta: &str) {
        if self.assistant_open
            && let Some(last) = self.messages.last_mut()
            && last.role == Role::Assistant
        {
            last.content.push_str(delta);
            return;
        }

        self.messages.push(TranscriptMessage {
            role: Role::Assistant,
            content: delta.to_string(),
            timestamp_ms: now_ms(),
        });
        self.assistant_open = true;
    }

    /// Close the open assistant turn. When the upstream supplies the full
    /// final transcript, it replaces the accumulated deltas as authoritative.
    pub fn finish_assistant_turn(&mut self, final_transcript: Option<&str>) {
        if let Some(text) = final_transcript {
            if self.assistant_open
                && let Some(last) = self.messages.last_mut()
                && last.role == Role::Assistant
            {
                last.content = text.to_string();
            } else if !text.is_empty() {
                self.messages.push(TranscriptMessage {
                    role: Role::Assistant,
                    content: text.to_string(),
                    timestamp_ms: now_ms(),
                });
            }
        }
        self.assistant_open = false;
    }

    /// Record a completed user transcription. Always a new entry.
    pub fn push_user_final(&mut self, text: &str) {
        self.messages.push(TranscriptMessage {
            role: Role::User,
            content: text.to_string(),
            timestamp_ms: now_ms(),
        });
        // A user turn in between ends any streaming assistant turn.
        self.assistant_open = false;
    }

    pub fn messages(&self) -> &[TranscriptMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&TranscriptMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
