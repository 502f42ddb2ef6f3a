use anyhow::{Context, Result};
use base64::Engine;
use std::io::Cursor;

use super::backend::AudioFrame;

/// One encoded segment of captured audio, sent to the agent as a unit
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Chunk number (0-indexed, per capture run)
    pub sequence: u64,
    /// Start time in milliseconds since capture started
    pub start_ms: u64,
    /// End time in milliseconds since capture started
    pub end_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Number of samples encoded in `data`
    pub sample_count: usize,
    /// WAV-encoded PCM
    pub data: Vec<u8>,
}

impl AudioChunk {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// Accumulates frames and seals them into WAV chunks on demand.
///
/// Boundaries are decided by the caller (a timer), never by content.
pub struct ChunkEncoder {
    buffer: Vec<i16>,
    start_ms: Option<u64>,
    end_ms: u64,
    sample_rate: u32,
    channels: u16,
    next_sequence: u64,
}

impl ChunkEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            buffer: Vec::new(),
            start_ms: None,
            end_ms: 0,
            sample_rate,
            channels,
            next_sequence: 0,
        }
    }

    pub fn push(&mut self, frame: &AudioFrame) {
        if self.start_ms.is_none() {
            self.start_ms = Some(frame.timestamp_ms);
        }
        self.end_ms = frame.timestamp_ms;
        self.sample_rate = frame.sample_rate;
        self.channels = frame.channels;
        self.buffer.extend_from_slice(&frame.samples);
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of chunks sealed so far
    pub fn chunks_sealed(&self) -> u64 {
        self.next_sequence
    }

    /// Encode everything buffered so far. Returns `None` when nothing is buffered.
    pub fn seal(&mut self) -> Result<Option<AudioChunk>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.buffer.len() * 2));
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).context("Failed to start WAV chunk")?;
            for &sample in &self.buffer {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV chunk")?;
            }
            writer.finalize().context("Failed to finalize WAV chunk")?;
        }

        let chunk = AudioChunk {
            sequence: self.next_sequence,
            start_ms: self.start_ms.unwrap_or(0),
            end_ms: self.end_ms,
            sample_rate: self.sample_rate,
            channels: self.channels,
            sample_count: self.buffer.len(),
            data: cursor.into_inner(),
        };

        self.next_sequence += 1;
        self.buffer.clear();
        self.start_ms = None;

        Ok(Some(chunk))
    }
}
