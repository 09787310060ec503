//! Session orchestration — one karaoke take from countdown to saved take.
//!
//! # Architecture
//!
//! ```text
//!               SessionHandle (commands)
//!                       │
//!                       ▼
//!            ┌─────────────────────┐   broadcast    ┌───────────────┐
//!            │  SessionController  │──────────────▶│ other players  │
//!            │  (single event loop)│   BecameLive   └───────────────┘
//!            └──────────┬──────────┘
//!          ┌────────────┼──────────────┬──────────────┐
//!          ▼            ▼              ▼              ▼
//!    PlaybackClock  CaptureSession  CountdownTimer  RecordingUploader
//!    (instrumental) (microphone)    (3-2-1)         (HTTP multipart)
//! ```
//!
//! The controller is the only component allowed to command playback and
//! capture together; renderers read the [`SharedSnapshot`] and never mutate
//! anything.

pub mod runner;
pub mod state;

pub use runner::{
    SessionCommand, SessionController, SessionEvent, SessionHandle, SessionNotice,
};
pub use state::{new_shared_snapshot, SessionPhase, SessionSnapshot, SharedSnapshot};
