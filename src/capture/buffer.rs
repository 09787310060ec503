//! Append-only take buffer and WAV encoding.
//!
//! Unlike a push-to-talk ring buffer, a karaoke take must keep its *head* —
//! the first sung note matters as much as the last — so [`TakeBuffer`] only
//! ever grows while capturing, is cleared wholesale on discard, and is
//! frozen to a WAV payload on finish.

use super::backend::AudioChunk;

// ---------------------------------------------------------------------------
// TakeBuffer
// ---------------------------------------------------------------------------

/// Ordered sequence of captured audio chunks for one take.
///
/// Owned by the capture session; the state machine never touches chunks
/// directly, only the frozen WAV bytes.
#[derive(Debug, Default)]
pub struct TakeBuffer {
    chunks: Vec<AudioChunk>,
}

impl TakeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk.  Chunks arrive in capture order; there is no
    /// reordering or overwrite.
    pub fn append(&mut self, chunk: AudioChunk) {
        self.chunks.push(chunk);
    }

    /// Discard everything (finish-and-discard / reset).
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Total number of interleaved samples across all chunks.
    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(|c| c.samples.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Capture duration in seconds, derived from the first chunk's format.
    pub fn duration_secs(&self) -> f32 {
        let Some(first) = self.chunks.first() else {
            return 0.0;
        };
        let frames = self.sample_count() as f32 / first.channels.max(1) as f32;
        frames / first.sample_rate.max(1) as f32
    }

    /// Encode the buffered audio as a 16-bit PCM WAV payload.
    ///
    /// Uses the format of the first chunk; a capture stream never changes
    /// format mid-take.  An empty buffer yields a valid header-only file.
    pub fn to_wav(&self) -> Vec<u8> {
        let (sample_rate, channels) = self
            .chunks
            .first()
            .map(|c| (c.sample_rate, c.channels))
            .unwrap_or((44_100, 1));

        let samples = self.chunks.iter().flat_map(|c| c.samples.iter().copied());
        encode_wav(samples, self.sample_count(), sample_rate, channels)
    }
}

// ---------------------------------------------------------------------------
// encode_wav
// ---------------------------------------------------------------------------

/// Serialize interleaved `f32` samples as a 16-bit PCM RIFF/WAVE file.
fn encode_wav(
    samples: impl Iterator<Item = f32>,
    sample_count: usize,
    sample_rate: u32,
    channels: u16,
) -> Vec<u8> {
    let data_len = (sample_count * 2) as u32;
    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
