//! Voice-call orchestration.
//!
//! `VoiceCall` is the client-side state machine behind a realtime voice
//! conversation: it drives microphone capture, forwards audio upstream,
//! feeds incoming assistant audio into the playback queue, accumulates the
//! transcript, and implements barge-in — the instant the user starts
//! speaking over the assistant, buffered playback is flushed and a
//! cancellation frame goes upstream.
//!
//! The orchestrator is single-threaded and event-driven: the embedding layer
//! calls [`VoiceCall::handle_frame`] for every text frame received from the
//! relay and [`VoiceCall::handle_capture_event`] for every event the capture
//! pipeline emits, and drains the outbound channel into the socket.

use std::sync::Arc;

use base64::prelude::*;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::capture::{AudioStreamer, CaptureConfig, CaptureEvent};
use crate::error::{CallError, CallResult};
use crate::playback::PlaybackController;
use crate::protocol::{ClientBoundFrame, ClientEvent, SidecarMessage, UpstreamEvent};
use crate::store::SessionStore;
use crate::transcript::{Role, TranscriptLog, TranscriptMessage};

/// Buffer size for outbound control frames.
const OUTBOUND_CHANNEL_SIZE: usize = 256;

/// Buffer size for capture events.
const CAPTURE_CHANNEL_SIZE: usize = 64;

/// Lifecycle status of a voice call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallStatus {
    /// Initial and terminal state; no call in progress.
    #[default]
    Idle,
    /// Call started, waiting for the relay to report the upstream open.
    Connecting,
    /// Upstream open; audio is flowing.
    Connected,
    /// The call failed; see the error field for the reason.
    Error,
}

/// Snapshot of the observable call state, for the embedding UI.
#[derive(Debug, Clone)]
pub struct VoiceCallState {
    pub status: CallStatus,
    pub is_muted: bool,
    pub is_ai_speaking: bool,
    pub transcript: Vec<TranscriptMessage>,
    /// Persisted session record id, when the store produced one. Its absence
    /// never blocks the call.
    pub voice_session_id: Option<String>,
    pub error: Option<String>,
}

/// Configuration for a voice call.
#[derive(Debug, Clone, Default)]
pub struct CallConfig {
    pub capture: CaptureConfig,
}

/// Client-side voice-call session state machine.
pub struct VoiceCall {
    status: CallStatus,
    muted: bool,
    error: Option<String>,
    playback: PlaybackController,
    transcript: TranscriptLog,
    streamer: AudioStreamer,
    outbound: mpsc::Sender<ClientEvent>,
    store: Arc<dyn SessionStore>,
    /// Written by the detached create_session task.
    session_id: Arc<Mutex<Option<String>>>,
}

impl VoiceCall {
    /// Create a call and the capture-event stream the embedder must drain
    /// into [`VoiceCall::handle_capture_event`]. Outbound control frames are
    /// pushed onto `outbound` for the embedder to write to the relay socket.
    pub fn new(
        config: CallConfig,
        store: Arc<dyn SessionStore>,
        outbound: mpsc::Sender<ClientEvent>,
    ) -> (Self, mpsc::Receiver<CaptureEvent>) {
        let (capture_tx, capture_rx) = mpsc::channel(CAPTURE_CHANNEL_SIZE);
        let call = Self {
            status: CallStatus::Idle,
            muted: false,
            error: None,
            playback: PlaybackController::new(),
            transcript: TranscriptLog::new(),
            streamer: AudioStreamer::new(config.capture, capture_tx),
            outbound,
            store,
            session_id: Arc::new(Mutex::new(None)),
        };
        (call, capture_rx)
    }

    /// Convenience constructor that also creates the outbound channel.
    pub fn with_channels(
        config: CallConfig,
        store: Arc<dyn SessionStore>,
    ) -> (Self, mpsc::Receiver<CaptureEvent>, mpsc::Receiver<ClientEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_SIZE);
        let (call, capture_rx) = Self::new(config, store, outbound_tx);
        (call, capture_rx, outbound_rx)
    }

    /// Start the call with the result of the microphone permission request.
    ///
    /// A permission denial lands in a distinct error state so the UI can
    /// tell it apart from transport failures; no socket is left half-open
    /// because none has been touched yet.
    pub fn start(&mut self, mic: CallResult<mpsc::Receiver<Vec<i16>>>) -> CallResult<()> {
        if self.status != CallStatus::Idle {
            return Err(CallError::InvalidState(format!(
                "call already {:?}",
                self.status
            )));
        }

        let source = match mic {
            Ok(source) => source,
            Err(err) => {
                warn!("microphone unavailable: {err}");
                self.status = CallStatus::Error;
                self.error = Some(err.to_string());
                return Err(err);
            }
        };

        self.streamer.start(source);
        self.status = CallStatus::Connecting;
        info!("voice call starting");

        // Best-effort session record; the call proceeds with or without it.
        let store = self.store.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            match store.create_session().await {
                Ok(id) => {
                    debug!(session_id = %id, "voice session record created");
                    *session_id.lock() = Some(id);
                }
                Err(err) => debug!("session record creation failed, continuing: {err}"),
            }
        });

        Ok(())
    }

    /// Process one text frame received from the relay.
    pub fn handle_frame(&mut self, text: &str) {
        let frame = match ClientBoundFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("unparseable relay frame, ignoring: {err}");
                return;
            }
        };

        match frame {
            ClientBoundFrame::Sidecar(sidecar) => self.handle_sidecar(sidecar),
            ClientBoundFrame::Upstream(event) => self.handle_upstream_event(event),
            ClientBoundFrame::Opaque(value) => {
                trace!(frame = %value, "opaque tunneled frame");
            }
        }
    }

    fn handle_sidecar(&mut self, sidecar: SidecarMessage) {
        match sidecar {
            SidecarMessage::UpstreamOpen => {
                if self.status == CallStatus::Connecting {
                    info!("upstream open, call connected");
                    self.status = CallStatus::Connected;
                } else {
                    debug!(status = ?self.status, "upstream.open in unexpected status");
                }
            }
            SidecarMessage::UpstreamError { message } => {
                warn!("upstream error: {message}");
                self.playback.clear();
                self.streamer.stop();
                self.status = CallStatus::Error;
                self.error = Some(message);
                self.spawn_end_session();
            }
            SidecarMessage::UpstreamClose { code, reason } => {
                info!(code, reason = %reason, "upstream closed");
                self.playback.clear();
                self.streamer.stop();
                if code == 1000 {
                    self.status = CallStatus::Idle;
                } else {
                    self.status = CallStatus::Error;
                    self.error = Some(format!("upstream closed: {code} {reason}"));
                }
                self.spawn_end_session();
            }
        }
    }

    fn handle_upstream_event(&mut self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::AudioDelta { delta, .. } => {
                if self.status != CallStatus::Connected {
                    debug!(status = ?self.status, "audio delta outside connected state, dropped");
                    return;
                }
                match BASE64_STANDARD.decode(&delta) {
                    Ok(audio) => {
                        if self.playback.on_audio_delta(Bytes::from(audio)) {
                            debug!("assistant started speaking");
                        }
                    }
                    Err(err) => warn!("undecodable audio delta: {err}"),
                }
            }
            UpstreamEvent::AudioDone { .. } => {
                self.playback.on_audio_done();
            }
            UpstreamEvent::AudioTranscriptDelta { delta } => {
                self.transcript.push_assistant_delta(&delta);
            }
            UpstreamEvent::AudioTranscriptDone { transcript } => {
                self.transcript.finish_assistant_turn(Some(&transcript));
                self.spawn_save_transcription(Role::Assistant, transcript);
            }
            UpstreamEvent::InputTranscriptionCompleted { transcript } => {
                self.transcript.push_user_final(&transcript);
                self.spawn_save_transcription(Role::User, transcript);
            }
            UpstreamEvent::ResponseDone { .. } => {
                self.playback.on_audio_done();
                self.transcript.finish_assistant_turn(None);
            }
            UpstreamEvent::Error { error } => {
                warn!(error = %error, "upstream reported an error event");
            }
        }
    }

    /// Process one event from the capture pipeline.
    pub fn handle_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Audio(chunk) => {
                if self.muted || self.status != CallStatus::Connected {
                    trace!("capture chunk dropped (muted or not connected)");
                    return;
                }
                self.send_control(ClientEvent::audio_append(&chunk));
            }
            CaptureEvent::SpeechStarted => {
                debug!("local VAD: user speech started");
                if self.playback.is_ai_speaking() {
                    self.interrupt();
                }
            }
            CaptureEvent::SpeechStopped => {
                trace!("local VAD: user speech stopped");
            }
        }
    }

    /// Cancel the assistant's in-flight speech: flush playback now, then
    /// notify upstream. The state change is synchronous; only the network
    /// message is asynchronous.
    pub fn interrupt(&mut self) {
        let cancel = self.playback.interrupt();
        info!("AI speech interrupted, playback flushed");
        self.send_control(cancel);
    }

    /// Mute the call. Capture is stopped entirely, not merely silenced.
    /// Idempotent.
    pub fn mute(&mut self) {
        if self.muted {
            return;
        }
        self.muted = true;
        self.streamer.stop();
        info!("call muted, capture stopped");
    }

    /// Unmute and restart capture from a fresh media source. Idempotent:
    /// when not muted the source is dropped untouched.
    pub fn unmute(&mut self, source: mpsc::Receiver<Vec<i16>>) {
        if !self.muted {
            return;
        }
        self.muted = false;
        self.streamer.start(source);
        info!("call unmuted, capture restarted");
    }

    /// End the call: stop capture, flush playback, close out the persisted
    /// session. Safe to call in any state.
    pub fn end(&mut self) {
        self.streamer.stop();
        self.playback.clear();
        self.muted = false;
        if self.status != CallStatus::Error {
            self.status = CallStatus::Idle;
        }
        info!("voice call ended");
        self.spawn_end_session();
    }

    /// Pull the next decoded audio chunk for the output device.
    pub fn next_playback_chunk(&mut self) -> Option<Bytes> {
        self.playback.next_chunk()
    }

    /// Number of playback chunks currently buffered.
    pub fn queued_playback(&self) -> usize {
        self.playback.queued()
    }

    pub fn is_ai_speaking(&self) -> bool {
        self.playback.is_ai_speaking()
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Snapshot of the observable call state.
    pub fn state(&self) -> VoiceCallState {
        VoiceCallState {
            status: self.status,
            is_muted: self.muted,
            is_ai_speaking: self.playback.is_ai_speaking(),
            transcript: self.transcript.messages().to_vec(),
            voice_session_id: self.session_id.lock().clone(),
            error: self.error.clone(),
        }
    }

    /// Fire-and-forget send of a control frame toward the relay.
    fn send_control(&self, event: ClientEvent) {
        if let Err(err) = self.outbound.try_send(event) {
            warn!("outbound frame dropped: {err}");
        }
    }

    /// Detached best-effort transcription persistence.
    fn spawn_save_transcription(&self, role: Role, content: String) {
        let store = self.store.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            let Some(id) = session_id.lock().clone() else {
                trace!("no session record, skipping transcription save");
                return;
            };
            if let Err(err) = store.save_transcription(&id, role, &content).await {
                debug!("transcription save failed, ignoring: {err}");
            }
        });
    }

    /// Detached best-effort session close-out.
    fn spawn_end_session(&self) {
        let store = self.store.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            let Some(id) = session_id.lock().take() else {
                return;
            };
            if let Err(err) = store.end_session(&id).await {
                debug!("session close-out failed, ignoring: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemorySessionStore, NoopSessionStore};
    use std::time::Duration;

    fn new_call() -> (VoiceCall, mpsc::Receiver<CaptureEvent>, mpsc::Receiver<ClientEvent>) {
        VoiceCall::with_channels(CallConfig::default(), Arc::new(NoopSessionStore))
    }

    fn connect(call: &mut VoiceCall) {
        let (_mic_tx, mic_rx) = mpsc::channel(4);
        call.start(Ok(mic_rx)).unwrap();
        call.handle_frame(r#"{"type":"upstream.open"}"#);
        assert_eq!(call.status(), CallStatus::Connected);
    }

    fn delta_frame(b64: &str) -> String {
        format!(r#"{{"type":"response.audio.delta","delta":"{b64}"}}"#)
    }

    #[tokio::test]
    async fn test_status_transitions_on_open() {
        let (mut call, _cap, _out) = new_call();
        assert_eq!(call.status(), CallStatus::Idle);

        let (_mic_tx, mic_rx) = mpsc::channel(4);
        call.start(Ok(mic_rx)).unwrap();
        assert_eq!(call.status(), CallStatus::Connecting);

        call.handle_frame(r#"{"type":"upstream.open"}"#);
        assert_eq!(call.status(), CallStatus::Connected);
    }

    #[tokio::test]
    async fn test_permission_denied_is_distinct_error() {
        let (mut call, _cap, _out) = new_call();
        let result = call.start(Err(CallError::PermissionDenied));
        assert!(matches!(result, Err(CallError::PermissionDenied)));
        assert_eq!(call.status(), CallStatus::Error);
        assert_eq!(
            call.state().error.as_deref(),
            Some("microphone permission denied")
        );
    }

    #[tokio::test]
    async fn test_barge_in_flushes_before_next_delta() {
        let (mut call, _cap, mut out) = new_call();
        connect(&mut call);

        call.handle_frame(&delta_frame("QUJD"));
        call.handle_frame(&delta_frame("REVG"));
        assert!(call.is_ai_speaking());
        assert_eq!(call.queued_playback(), 2);

        // Simulated speech detection while the AI is speaking.
        call.handle_capture_event(CaptureEvent::SpeechStarted);

        // Synchronous effects: flag down, queue empty, before any further
        // delta is processed.
        assert!(!call.is_ai_speaking());
        assert_eq!(call.queued_playback(), 0);

        // The cancellation frame with a fresh correlation id went out.
        let frame = out.try_recv().expect("expected cancel frame");
        assert!(matches!(frame, ClientEvent::ResponseCancel { .. }));

        // A delta arriving after the interrupt starts a fresh response.
        call.handle_frame(&delta_frame("QUJD"));
        assert!(call.is_ai_speaking());
        assert_eq!(call.queued_playback(), 1);
    }

    #[tokio::test]
    async fn test_speech_start_without_ai_speaking_sends_nothing() {
        let (mut call, _cap, mut out) = new_call();
        connect(&mut call);

        call.handle_capture_event(CaptureEvent::SpeechStarted);
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_transcript_deltas_accumulate_into_one_entry() {
        let (mut call, _cap, _out) = new_call();
        connect(&mut call);

        for delta in ["Bon", "jour", "!"] {
            call.handle_frame(&format!(
                r#"{{"type":"response.audio_transcript.delta","delta":"{delta}"}}"#
            ));
        }

        let state = call.state();
        assert_eq!(state.transcript.len(), 1);
        assert_eq!(state.transcript[0].content, "Bonjour!");
        assert_eq!(state.transcript[0].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_user_transcription_always_new_entry() {
        let (mut call, _cap, _out) = new_call();
        connect(&mut call);

        call.handle_frame(r#"{"type":"response.audio_transcript.delta","delta":"hi"}"#);
        call.handle_frame(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"hello"}"#,
        );

        let state = call.state();
        assert_eq!(state.transcript.len(), 2);
        assert_eq!(state.transcript[1].role, Role::User);
        assert_eq!(state.transcript[1].content, "hello");
    }

    #[tokio::test]
    async fn test_mute_idempotent_and_unmute_restarts() {
        let (mut call, _cap, _out) = new_call();
        connect(&mut call);
        assert!(!call.is_muted());

        call.mute();
        assert!(call.is_muted());
        // Double mute: capture already stopped, no panic, still muted.
        call.mute();
        assert!(call.is_muted());

        let (_mic_tx, mic_rx) = mpsc::channel(4);
        call.unmute(mic_rx);
        assert!(!call.is_muted());

        // Unmute while not muted drops the source untouched.
        let (_mic_tx2, mic_rx2) = mpsc::channel(4);
        call.unmute(mic_rx2);
        assert!(!call.is_muted());
    }

    #[tokio::test]
    async fn test_end_resets_mute_for_next_call() {
        let (mut call, _cap, mut out) = new_call();
        connect(&mut call);
        call.mute();
        call.end();
        assert!(!call.is_muted());

        // A fresh call on the same instance starts unmuted and streams.
        connect(&mut call);
        call.handle_capture_event(CaptureEvent::Audio(Bytes::from_static(b"ABC")));
        assert!(out.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_muted_capture_chunks_not_sent() {
        let (mut call, _cap, mut out) = new_call();
        connect(&mut call);
        call.mute();

        call.handle_capture_event(CaptureEvent::Audio(Bytes::from_static(b"\x01\x02")));
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_capture_chunk_sent_as_audio_append() {
        let (mut call, _cap, mut out) = new_call();
        connect(&mut call);

        call.handle_capture_event(CaptureEvent::Audio(Bytes::from_static(b"ABC")));
        match out.try_recv().expect("expected audio frame") {
            ClientEvent::InputAudioBufferAppend { audio } => assert_eq!(audio, "QUJD"),
            other => panic!("expected append, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delta_ignored_when_not_connected() {
        let (mut call, _cap, _out) = new_call();
        call.handle_frame(&delta_frame("QUJD"));
        assert!(!call.is_ai_speaking());
        assert_eq!(call.queued_playback(), 0);
    }

    #[tokio::test]
    async fn test_upstream_error_sidecar_fails_call() {
        let (mut call, _cap, _out) = new_call();
        connect(&mut call);
        call.handle_frame(&delta_frame("QUJD"));

        call.handle_frame(r#"{"type":"upstream.error","message":"connect reset"}"#);
        assert_eq!(call.status(), CallStatus::Error);
        assert_eq!(call.queued_playback(), 0);
        assert!(!call.is_ai_speaking());
        assert!(call.state().error.unwrap().contains("connect reset"));
    }

    #[tokio::test]
    async fn test_upstream_close_normal_returns_to_idle() {
        let (mut call, _cap, _out) = new_call();
        connect(&mut call);

        call.handle_frame(r#"{"type":"upstream.close","code":1000,"reason":"bye"}"#);
        assert_eq!(call.status(), CallStatus::Idle);
    }

    #[tokio::test]
    async fn test_garbage_frame_is_ignored() {
        let (mut call, _cap, _out) = new_call();
        connect(&mut call);
        call.handle_frame("not json at all");
        assert_eq!(call.status(), CallStatus::Connected);
    }

    #[tokio::test]
    async fn test_transcriptions_persisted_best_effort() {
        let store = Arc::new(MemorySessionStore::new());
        let (mut call, _cap, _out) =
            VoiceCall::with_channels(CallConfig::default(), store.clone());
        connect(&mut call);

        // Wait for the detached create_session task to land an id.
        let id = wait_for_session_id(&call).await;

        call.handle_frame(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"hola"}"#,
        );

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if !store.transcriptions(&id).is_empty() {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "transcription never saved");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.transcriptions(&id)[0].content, "hola");

        call.end();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !store.is_ended(&id) {
            assert!(tokio::time::Instant::now() < deadline, "session never ended");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_upstream_error_closes_session_record() {
        let store = Arc::new(MemorySessionStore::new());
        let (mut call, _cap, _out) =
            VoiceCall::with_channels(CallConfig::default(), store.clone());
        connect(&mut call);
        let id = wait_for_session_id(&call).await;

        call.handle_frame(r#"{"type":"upstream.error","message":"conn reset"}"#);
        assert_eq!(call.status(), CallStatus::Error);

        // The persisted record is closed out on the error path too.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !store.is_ended(&id) {
            assert!(tokio::time::Instant::now() < deadline, "session never ended");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_call_survives_missing_session_record() {
        // A store that cannot even create sessions must not affect the call.
        struct FailingStore;
        #[async_trait::async_trait]
        impl SessionStore for FailingStore {
            async fn create_session(&self) -> Result<String, crate::error::StoreError> {
                Err(crate::error::StoreError("down".into()))
            }
            async fn save_transcription(
                &self,
                _: &str,
                _: Role,
                _: &str,
            ) -> Result<(), crate::error::StoreError> {
                Err(crate::error::StoreError("down".into()))
            }
            async fn end_session(&self, _: &str) -> Result<(), crate::error::StoreError> {
                Err(crate::error::StoreError("down".into()))
            }
        }

        let (mut call, _cap, _out) =
            VoiceCall::with_channels(CallConfig::default(), Arc::new(FailingStore));
        connect(&mut call);
        call.handle_frame(&delta_frame("QUJD"));
        assert!(call.is_ai_speaking());
        call.end();
        assert_eq!(call.status(), CallStatus::Idle);
    }

    async fn wait_for_session_id(call: &VoiceCall) -> String {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(id) = call.state().voice_session_id {
                return id;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "session id never created"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
