//! Energy-based voice activity detection.
//!
//! A lightweight RMS-threshold detector used by the capture pipeline to spot
//! the silence-to-speech transition that triggers barge-in. It trades the
//! accuracy of an ML detector for zero model weight, which is the right call
//! on the client side of a voice call: the upstream service runs its own
//! server-side VAD, this one only needs to notice that the user started
//! talking.

use serde::{Deserialize, Serialize};

/// Configuration for energy-based voice activity detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Normalized RMS threshold (0.0 - 1.0). Frames above it count as speech.
    pub threshold: f32,

    /// Minimum speech duration before triggering speech_start (ms).
    /// Helps filter out brief noise spikes.
    pub min_speech_duration_ms: u32,

    /// Minimum silence duration before triggering speech_end (ms).
    /// Prevents premature end detection during pauses.
    pub min_silence_duration_ms: u32,

    /// Sample rate of the incoming audio (Hz).
    pub sample_rate: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.015,
            min_speech_duration_ms: 100,
            min_silence_duration_ms: 400,
            sample_rate: 24000,
        }
    }
}

/// Result of VAD processing for a single audio frame.
#[derive(Debug, Clone, Default)]
pub struct VadResult {
    /// Whether the current frame contains speech
    pub is_speech: bool,
    /// Whether speech just started (transition from silence to speech)
    pub speech_start: bool,
    /// Whether speech just ended (transition from speech to silence)
    pub speech_end: bool,
}

/// RMS-threshold voice activity detector with duration hysteresis.
pub struct EnergyVad {
    config: VadConfig,
    speaking: bool,
    /// Consecutive speech-frame time while silent (ms)
    pending_speech_ms: f32,
    /// Consecutive silence-frame time while speaking (ms)
    pending_silence_ms: f32,
}

impl EnergyVad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            speaking: false,
            pending_speech_ms: 0.0,
            pending_silence_ms: 0.0,
        }
    }

    /// Process one frame of PCM16 samples and report state transitions.
    pub fn process_frame(&mut self, samples: &[i16]) -> VadResult {
        if samples.is_empty() {
            return VadResult::default();
        }

        let frame_ms = samples.len() as f32 * 1000.0 / self.config.sample_rate as f32;
        let energetic = Self::rms(samples) >= self.config.threshold;

        let mut result = VadResult {
            is_speech: energetic,
            ..Default::default()
        };

        if energetic {
            self.pending_silence_ms = 0.0;
            if !self.speaking {
                self.pending_speech_ms += frame_ms;
                if self.pending_speech_ms >= self.config.min_speech_duration_ms as f32 {
                    self.speaking = true;
                    self.pending_speech_ms = 0.0;
                    result.speech_start = true;
                }
            }
        } else {
            self.pending_speech_ms = 0.0;
            if self.speaking {
                self.pending_silence_ms += frame_ms;
                if self.pending_silence_ms >= self.config.min_silence_duration_ms as f32 {
                    self.speaking = false;
                    self.pending_silence_ms = 0.0;
                    result.speech_end = true;
                }
            }
        }

        result
    }

    /// Check if currently in speech state.
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Reset internal state (call when starting a new audio stream).
    pub fn reset(&mut self) {
        self.speaking = false;
        self.pending_speech_ms = 0.0;
        self.pending_silence_ms = 0.0;
    }

    /// Get the configuration.
    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Normalized RMS of a PCM16 frame (0.0 - 1.0).
    fn rms(samples: &[i16]) -> f32 {
        let sum_sq: f64 = samples
            .iter()
            .map(|&s| {
                let v = s as f64 / i16::MAX as f64;
                v * v
            })
            .sum();
        (sum_sq / samples.len() as f64).sqrt() as f32
    }
}
