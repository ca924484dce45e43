//! Audio capture and streaming pipeline.
//!
//! Receives raw PCM samples from a media source (microphone callback,
//! capture thread), accumulates them into fixed-duration chunks, optionally
//! runs local voice-activity detection, and emits capture events on a
//! cadence. Emission is fire-and-forget per chunk; the streamer never waits
//! for network acknowledgement.
//!
//! The media source is an `mpsc::Receiver<Vec<i16>>` so the library stays
//! independent of any particular audio backend: the embedding layer feeds
//! whatever its platform provides.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::vad::{EnergyVad, VadConfig};

/// Configuration for the capture/streaming pipeline.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate of the source audio (Hz).
    pub sample_rate: u32,
    /// Chunk accumulation window (ms). Larger windows trade latency for
    /// fewer messages on the wire.
    pub chunk_duration_ms: u32,
    /// Local voice-activity detection; `None` disables it.
    pub vad: Option<VadConfig>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            chunk_duration_ms: 200,
            vad: Some(VadConfig::default()),
        }
    }
}

impl CaptureConfig {
    /// Samples accumulated before a chunk is emitted.
    pub fn samples_per_chunk(&self) -> usize {
        (self.sample_rate * self.chunk_duration_ms / 1000) as usize
    }
}

/// Events emitted by the capture pipeline.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// A complete chunk of captured audio, PCM16 little-endian.
    Audio(Bytes),
    /// Local VAD detected a silence-to-speech transition. This is the
    /// barge-in hook: the orchestrator cancels AI playback on it.
    SpeechStarted,
    /// Local VAD detected the end of a speech segment.
    SpeechStopped,
}

/// Streams microphone PCM to the call orchestrator as chunked events.
///
/// `start` and `stop` are idempotent and safe to call in any order relative
/// to call state; `stop` releases the media source by dropping its receiver.
pub struct AudioStreamer {
    config: CaptureConfig,
    events: mpsc::Sender<CaptureEvent>,
    task: Option<JoinHandle<()>>,
}

impl AudioStreamer {
    /// Create a streamer that emits events on the given channel.
    pub fn new(config: CaptureConfig, events: mpsc::Sender<CaptureEvent>) -> Self {
        Self {
            config,
            events,
            task: None,
        }
    }

    /// Begin periodic emission of audio chunks from the given source.
    ///
    /// Calling `start` while already running is a no-op; the original source
    /// keeps streaming.
    pub fn start(&mut self, source: mpsc::Receiver<Vec<i16>>) {
        if self.task.is_some() {
            debug!("audio streamer already running, ignoring start");
            return;
        }

        let config = self.config.clone();
        let events = self.events.clone();
        debug!(
            sample_rate = config.sample_rate,
            chunk_ms = config.chunk_duration_ms,
            "audio streamer starting"
        );
        self.task = Some(tokio::spawn(run_capture_loop(config, source, events)));
    }

    /// Halt emission and release the media source.
    ///
    /// Safe to call repeatedly; only the first call after a `start` does
    /// anything.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("audio streamer stopped");
        }
    }

    /// Whether capture is currently running.
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for AudioStreamer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accumulate samples into chunks and emit them until the source closes.
async fn run_capture_loop(
    config: CaptureConfig,
    mut source: mpsc::Receiver<Vec<i16>>,
    events: mpsc::Sender<CaptureEvent>,
) {
    let samples_per_chunk = config.samples_per_chunk();
    let mut buffer: Vec<i16> = Vec::with_capacity(samples_per_chunk * 2);
    let mut vad = config.vad.clone().map(EnergyVad::new);
    let mut chunks_sent = 0u64;

    while let Some(samples) = source.recv().await {
        if let Some(vad) = vad.as_mut() {
            let result = vad.process_frame(&samples);
            if result.speech_start && events.send(CaptureEvent::SpeechStarted).await.is_err() {
                break;
            }
            if result.speech_end && events.send(CaptureEvent::SpeechStopped).await.is_err() {
                break;
            }
        }

        buffer.extend(samples);

        while buffer.len() >= samples_per_chunk {
            let chunk: Vec<i16> = buffer.drain(..samples_per_chunk).collect();
            if events
                .send(CaptureEvent::Audio(pcm16_to_bytes(&chunk)))
                .await
                .is_err()
            {
                warn!("capture event channel closed, stopping streamer");
                return;
            }
            chunks_sent += 1;
        }
    }

    // Source closed; flush the partial tail so no captured speech is lost.
    if !buffer.is_empty() {
        let _ = events.send(CaptureEvent::Audio(pcm16_to_bytes(&buffer))).await;
        chunks_sent += 1;
    }

    debug!(chunks_sent, "capture source closed, streamer loop ended");
}

/// Encode PCM16 samples as little-endian bytes.
fn pcm16_to_bytes(samples: &[i16]) -> Bytes {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    Bytes::from(out)
}
