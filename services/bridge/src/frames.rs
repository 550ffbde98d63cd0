//! Data model shared across the bridge pipeline.
//!
//! Frames are immutable once built; each pipeline stage consumes and
//! replaces them, never holding a reference after handing one downstream.

use bytes::Bytes;

/// One unit of PCM audio moving through the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw little-endian PCM payload.
    pub payload: Bytes,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
    /// Monotonic per-session sequence number, assigned at the stage that
    /// creates the frame.
    pub seq: u64,
    /// Platform timestamp string, when the wire message carried one.
    pub timestamp: Option<String>,
    /// Raw id of the call participant the audio belongs to.
    pub participant: Option<String>,
    /// True when the sender marked the buffer as containing only silence.
    pub silent: bool,
}

impl AudioFrame {
    /// Builds a frame holding resampler or model output, which carries no
    /// participant metadata.
    pub fn from_pcm(payload: Bytes, sample_rate: u32, seq: u64) -> Self {
        AudioFrame {
            payload,
            sample_rate,
            bit_depth: 16,
            channels: 1,
            seq,
            timestamp: None,
            participant: None,
            silent: false,
        }
    }
}

/// A non-audio signal exchanged with the telephony side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    /// Tells the platform to discard queued playback immediately (barge-in).
    StopAudio,
    /// A named marker echoed back by the platform once playback reaches it.
    Mark(String),
}

/// The unit carried by the outbound dispatcher queue. Items reach the wire
/// in exactly the order they were enqueued.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundItem {
    Audio(AudioFrame),
    Control(ControlFrame),
}

/// Immutable per-direction resampling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleFormat {
    pub source_rate: u32,
    pub target_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
    /// Fixed size, in bytes, of every emitted output chunk.
    pub chunk_bytes: usize,
}

impl ResampleFormat {
    pub fn new(source_rate: u32, target_rate: u32, chunk_bytes: usize) -> Self {
        ResampleFormat {
            source_rate,
            target_rate,
            bit_depth: 16,
            channels: 1,
            chunk_bytes,
        }
    }

    /// Output/input sample-rate ratio.
    pub fn ratio(&self) -> f64 {
        self.target_rate as f64 / self.source_rate as f64
    }
}
