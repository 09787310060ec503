//! Microphone level meter for the display snapshot.
//!
//! Display-only: the level carries no correctness obligation, it just gives
//! the renderer something to animate while the user sings.

// ---------------------------------------------------------------------------
// chunk_rms
// ---------------------------------------------------------------------------

/// RMS amplitude of one chunk of samples, clamped to `[0.0, 1.0]`.
pub fn chunk_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_sq: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean_sq.sqrt().min(1.0)
}

// ---------------------------------------------------------------------------
// LevelMeter
// ---------------------------------------------------------------------------

/// Exponentially smoothed amplitude level.
///
/// Raw per-chunk RMS flickers at chunk rate; a decay factor keeps the
/// displayed level stable while still reacting quickly to peaks.
#[derive(Debug)]
pub struct LevelMeter {
    level: f32,
    /// Fraction of the previous level retained per update, in `[0, 1)`.
    decay: f32,
}

impl LevelMeter {
    pub fn new(decay: f32) -> Self {
        Self {
            level: 0.0,
            decay: decay.clamp(0.0, 0.99),
        }
    }

    /// Fold one chunk into the level; rises immediately, falls smoothly.
    pub fn update(&mut self, samples: &[f32]) -> f32 {
        let rms = chunk_rms(samples);
        self.level = if rms > self.level {
            rms
        } else {
            self.level * self.decay + rms * (1.0 - self.decay)
        };
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new(0.8)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
