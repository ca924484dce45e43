//! Playback queue and interrupt controller for assistant audio.
//!
//! Tracks the {silent, playing} state machine over incoming audio deltas and
//! implements barge-in: `interrupt` clears the entire queue and flips the
//! speaking flag synchronously, then hands the caller a cancellation frame to
//! send upstream. Any buffering between detection and flush would reintroduce
//! the "AI talks over the user" defect, so there is none.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::protocol::ClientEvent;

/// Playback state over incoming assistant audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No assistant audio queued or playing.
    #[default]
    Silent,
    /// Assistant audio queued and/or being played out.
    Playing,
}

/// Queue of decoded assistant audio chunks plus the AI-speaking flag.
#[derive(Debug, Default)]
pub struct PlaybackController {
    queue: VecDeque<Bytes>,
    state: PlaybackState,
    ai_speaking: bool,
    /// Response completed upstream; drain the queue then go silent.
    response_done: bool,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a decoded audio chunk. Returns true when this delta started a
    /// new response (silent -> playing transition).
    pub fn on_audio_delta(&mut self, chunk: Bytes) -> bool {
        let started = self.state == PlaybackState::Silent;
        self.queue.push_back(chunk);
        self.state = PlaybackState::Playing;
        self.ai_speaking = true;
        self.response_done = false;
        started
    }

    /// Mark the current response's audio as complete. The speaking flag drops
    /// immediately; the state machine goes silent once the queue drains.
    pub fn on_audio_done(&mut self) {
        self.ai_speaking = false;
        self.response_done = true;
        if self.queue.is_empty() {
            self.state = PlaybackState::Silent;
        }
    }

    /// Pull the next chunk for the audio output device.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        let chunk = self.queue.pop_front();
        if self.queue.is_empty() && self.response_done {
            self.state = PlaybackState::Silent;
        }
        chunk
    }

    /// Barge-in: flush everything buffered, stop speaking, and produce the
    /// cancellation frame to send upstream. Entirely synchronous.
    pub fn interrupt(&mut self) -> ClientEvent {
        self.queue.clear();
        self.state = PlaybackState::Silent;
        self.ai_speaking = false;
        self.response_done = false;
        ClientEvent::cancel()
    }

    /// Drop all buffered audio without producing a cancellation frame.
    /// Used when the call itself ends.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.state = PlaybackState::Silent;
        self.ai_speaking = false;
        self.response_done = false;
    }

    pub fn is_ai_speaking(&self) -> bool {
        self.ai_speaking
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Number of chunks waiting to be played.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
