//! Stateful PCM resampling pipeline.
//!
//! One [`ResamplePipeline`] exists per {session, direction} pair and is
//! never shared: partial input samples and partial output chunks carry
//! across [`ResamplePipeline::push`] calls, and sharing an instance would
//! bleed remainders between unrelated calls.
//!
//! `push` only ever emits full, uniformly sized chunks; [`ResamplePipeline::flush`]
//! drains the remainder and may emit one trailing chunk smaller than the
//! configured size. A conversion failure drops the offending block with a
//! warning and leaves the pipeline usable for subsequent audio.

use crate::audio;
use crate::frames::ResampleFormat;
use anyhow::Result;
use bytes::Bytes;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::warn;

/// Input block duration fed to the resampler per conversion call.
const INPUT_BLOCK_MS: usize = 20;

pub struct ResamplePipeline {
    format: ResampleFormat,
    resampler: FastFixedIn<f32>,
    /// Input samples per conversion call.
    input_block: usize,
    /// Raw inbound bytes not yet forming a whole sample pair.
    pending_bytes: Vec<u8>,
    /// Decoded samples waiting for a full input block.
    pending_samples: Vec<f32>,
    /// Converted output bytes waiting to fill a chunk.
    out_bytes: Vec<u8>,
}

impl ResamplePipeline {
    pub fn new(format: ResampleFormat) -> Result<Self> {
        let input_block = format.source_rate as usize * INPUT_BLOCK_MS / 1000;
        let resampler = FastFixedIn::<f32>::new(
            format.ratio(),
            1.0,
            PolynomialDegree::Cubic,
            input_block,
            format.channels as usize,
        )?;
        Ok(ResamplePipeline {
            format,
            resampler,
            input_block,
            pending_bytes: Vec::new(),
            pending_samples: Vec::new(),
            out_bytes: Vec::new(),
        })
    }

    pub fn format(&self) -> &ResampleFormat {
        &self.format
    }

    /// Feeds raw PCM16 bytes in, returns zero or more full chunks at the
    /// target rate. Remainders stay buffered for the next call.
    pub fn push(&mut self, pcm: &[u8]) -> Vec<Bytes> {
        self.buffer_input(pcm);
        while self.pending_samples.len() >= self.input_block {
            let block: Vec<f32> = self.pending_samples.drain(..self.input_block).collect();
            match self.resampler.process(&[block], None) {
                Ok(waves) => self.out_bytes.extend(audio::f32_to_bytes(&waves[0])),
                Err(e) => warn!(error = %e, "Dropping audio block that failed to resample."),
            }
        }
        self.drain_chunks()
    }

    /// Drains everything still buffered. All emitted chunks are full-sized
    /// except possibly the last. After a flush the pipeline is empty and
    /// ready for further input.
    pub fn flush(&mut self) -> Vec<Bytes> {
        if !self.pending_samples.is_empty() {
            let expected = (self.pending_samples.len() as f64 * self.format.ratio()).round() as usize;
            let block: Vec<f32> = self.pending_samples.drain(..).collect();
            match self.resampler.process_partial(Some(&[block]), None) {
                Ok(waves) => {
                    // Anything past the proportional length is zero padding.
                    let take = expected.min(waves[0].len());
                    self.out_bytes.extend(audio::f32_to_bytes(&waves[0][..take]));
                }
                Err(e) => warn!(error = %e, "Dropping final audio block that failed to resample."),
            }
        }
        self.pending_bytes.clear();
        let mut chunks = self.drain_chunks();
        if !self.out_bytes.is_empty() {
            chunks.push(Bytes::from(std::mem::take(&mut self.out_bytes)));
        }
        chunks
    }

    /// Discards all buffered remainders without emitting them. Used when a
    /// truncated utterance's tail must not prefix the next one.
    pub fn reset(&mut self) {
        self.pending_bytes.clear();
        self.pending_samples.clear();
        self.out_bytes.clear();
        self.resampler.reset();
    }

    fn buffer_input(&mut self, pcm: &[u8]) {
        self.pending_bytes.extend_from_slice(pcm);
        let whole = self.pending_bytes.len() - self.pending_bytes.len() % 2;
        let taken: Vec<u8> = self.pending_bytes.drain(..whole).collect();
        self.pending_samples.extend(audio::bytes_to_f32(&taken));
    }

    fn drain_chunks(&mut self) -> Vec<Bytes> {
        let chunk = self.format.chunk_bytes;
        let mut chunks = Vec::new();
        while self.out_bytes.len() >= chunk {
            let head: Vec<u8> = self.out_bytes.drain(..chunk).collect();
            chunks.push(Bytes::from(head));
        }
        chunks
    }
}
