//! Client-side library for realtime voice calls over the relay gateway.
//!
//! The library is transport- and platform-agnostic: media comes in as raw
//! PCM over a channel, outbound frames leave on a channel, and the embedding
//! layer owns the actual socket and audio devices. What lives here is the
//! session state machine ([`call::VoiceCall`]), the capture pipeline
//! ([`capture::AudioStreamer`]), playback with barge-in
//! ([`playback::PlaybackController`]), the wire protocol shared with the
//! gateway ([`protocol`]), and the injected persistence seam
//! ([`store::SessionStore`]).

pub mod call;
pub mod capture;
pub mod error;
pub mod playback;
pub mod protocol;
pub mod store;
pub mod transcript;
pub mod vad;

pub use call::{CallConfig, CallStatus, VoiceCall, VoiceCallState};
pub use capture::{AudioStreamer, CaptureConfig, CaptureEvent};
pub use error::{CallError, CallResult, StoreError};
pub use playback::{PlaybackController, PlaybackState};
pub use protocol::{ClientBoundFrame, ClientEvent, SidecarMessage, UpstreamEvent};
pub use store::{MemorySessionStore, NoopSessionStore, SessionStore};
pub use transcript::{Role, TranscriptLog, TranscriptMessage};
pub use vad::{EnergyVad, VadConfig, VadResult};
