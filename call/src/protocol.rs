//! Wire protocol for the realtime voice relay.
//!
//! The relay gateway tunnels the upstream realtime-API protocol without
//! inspecting it; the only structured messages it produces itself are the
//! sidecar frames defined here. The client, however, must understand both the
//! sidecar frames and the subset of upstream server events that drive
//! playback and transcripts, so all of those types live in this module and
//! are shared with the gateway crate.

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Control frames the relay injects into the proxy-to-client stream.
///
/// These are the only frames on the wire the relay generates itself; every
/// other frame is tunneled byte-for-byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SidecarMessage {
    /// Upstream connection established; the client may start streaming.
    #[serde(rename = "upstream.open")]
    UpstreamOpen,

    /// Upstream connection failed after (or while) being established.
    #[serde(rename = "upstream.error")]
    UpstreamError { message: String },

    /// Upstream closed; the client should treat the call as ended.
    #[serde(rename = "upstream.close")]
    UpstreamClose { code: u16, reason: String },
}

/// The subset of upstream realtime-API server events the call orchestrator
/// reacts to. Everything else tunnels through as [`ClientBoundFrame::Opaque`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamEvent {
    /// Chunk of synthesized assistant audio, base64-encoded PCM16.
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
        delta: String,
    },

    /// Assistant audio for the current response is complete.
    #[serde(rename = "response.audio.done")]
    AudioDone {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
    },

    /// Incremental transcript of the assistant's speech.
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: String },

    /// Final transcript of the assistant's speech for this turn.
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone { transcript: String },

    /// Completed transcription of the user's audio input.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted { transcript: String },

    /// The model finished generating the current response.
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
    },

    /// Upstream-reported error event.
    #[serde(rename = "error")]
    Error { error: serde_json::Value },
}

/// Every JSON text frame the client can receive from the relay.
///
/// Variant order matters: sidecar frames are matched first, then the known
/// upstream events, and anything else falls through to `Opaque` so the
/// processing match stays exhaustive without the orchestrator having to know
/// the full tunneled protocol.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClientBoundFrame {
    Sidecar(SidecarMessage),
    Upstream(UpstreamEvent),
    Opaque(serde_json::Value),
}

impl ClientBoundFrame {
    /// Parse a text frame received from the relay.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Control events the client sends toward the upstream model service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Append captured audio to the upstream input buffer.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    /// Commit the input buffer (manual turn detection).
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    /// Cancel the in-flight response. Carries a fresh correlation id so the
    /// cancellation can be matched against upstream acknowledgements.
    #[serde(rename = "response.cancel")]
    ResponseCancel { event_id: String },
}

impl ClientEvent {
    /// Build an audio append event from raw PCM16 bytes.
    pub fn audio_append(audio: &Bytes) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(audio),
        }
    }

    /// Build a cancellation event with a fresh correlation id.
    pub fn cancel() -> Self {
        ClientEvent::ResponseCancel {
            event_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}
