//! Microphone capture — device lifecycle, take buffering, level metering.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → drain thread
//!           → LevelMeter (always) + TakeBuffer (only while capturing)
//! ```
//!
//! [`CaptureSession`] owns one acquire → start/pause/resume → stop →
//! release lifecycle; the session state machine drives it and reads back
//! only the level and the frozen WAV payload.

pub mod backend;
pub mod buffer;
pub mod level;
pub mod session;

pub use backend::{AudioChunk, CaptureBackend, CaptureError, CaptureStream, CpalBackend};
pub use buffer::TakeBuffer;
pub use level::{chunk_rms, LevelMeter};
pub use session::CaptureSession;

#[cfg(test)]
pub use backend::MockCaptureBackend;
