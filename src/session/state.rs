//! Session state machine phases and shared display snapshot.
//!
//! [`SessionPhase`] drives the controller's state machine.  Front-ends read
//! the current phase (and everything else they need to render) through
//! [`SharedSnapshot`].
//!
//! [`SessionSnapshot`] is the single source of truth for display: current
//! phase, playback position, countdown value, active lyric line, mic level,
//! and any error message.
//!
//! [`SharedSnapshot`] is a type alias for `Arc<Mutex<SessionSnapshot>>` —
//! cheap to clone and safe to share across threads.

use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Phases of a karaoke recording take.
///
/// The state machine transitions are:
///
/// ```text
/// Idle ──start──▶ Arming ──countdown armed──▶ Live ⇄ Paused
///                        ──cancel──▶ Idle
/// Live / Paused ──finish or end-of-track──▶ Finishing ──upload ok──▶ Saved
///               ──reset──▶ Discarded
/// Saved / Discarded ──new take──▶ Idle
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    /// No take in progress; playback may be previewed and seeked freely.
    Idle,

    /// Countdown running; capture device acquired and playback warmed up,
    /// but nothing started yet.
    Arming,

    /// Playback and capture are both running, started in the same step.
    Live,

    /// Playback and capture are both suspended mid-take.
    Paused,

    /// The take has been frozen and handed to the uploader; waiting for the
    /// submission outcome.
    Finishing,

    /// Terminal: the take was uploaded successfully.
    Saved,

    /// Terminal: the take was thrown away without saving.
    Discarded,
}

impl SessionPhase {
    /// Returns `true` while a take is in flight (device held, buffer live).
    ///
    /// ```
    /// use karaoke_session::session::SessionPhase;
    ///
    /// assert!(!SessionPhase::Idle.is_active());
    /// assert!(SessionPhase::Arming.is_active());
    /// assert!(SessionPhase::Live.is_active());
    /// assert!(SessionPhase::Paused.is_active());
    /// assert!(SessionPhase::Finishing.is_active());
    /// assert!(!SessionPhase::Saved.is_active());
    /// assert!(!SessionPhase::Discarded.is_active());
    /// ```
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionPhase::Arming
                | SessionPhase::Live
                | SessionPhase::Paused
                | SessionPhase::Finishing
        )
    }

    /// Returns `true` for phases that end a take.  A new take restarts the
    /// machine at [`SessionPhase::Idle`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Saved | SessionPhase::Discarded)
    }

    /// A short human-readable label suitable for a status line.
    pub fn label(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "Idle",
            SessionPhase::Arming => "Get ready",
            SessionPhase::Live => "Recording",
            SessionPhase::Paused => "Paused",
            SessionPhase::Finishing => "Saving",
            SessionPhase::Saved => "Saved",
            SessionPhase::Discarded => "Discarded",
        }
    }
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Idle
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Shared display state — the single source of truth for any front-end.
///
/// Held behind [`SharedSnapshot`] (`Arc<Mutex<SessionSnapshot>>`).  The
/// session controller mutates it on every tick; a display loop reads it
/// each frame.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// Current phase of the take.
    pub phase: SessionPhase,

    /// Title of the loaded track, if any.
    pub track_title: Option<String>,

    /// Current playback position.
    pub position: Duration,

    /// Total track duration, when the decoder reports one.
    pub duration: Option<Duration>,

    /// Countdown value during [`SessionPhase::Arming`] (3, 2, 1), `None`
    /// otherwise.
    pub countdown: Option<u32>,

    /// Index into the track's lyric lines of the line active at `position`.
    ///
    /// `None` between lines, before the first line, and after the last.
    pub lyric_index: Option<usize>,

    /// Smoothed microphone input level in `[0.0, 1.0]`.
    pub mic_level: f32,

    /// Identifier of the saved recording once the upload completes.
    pub artifact_id: Option<String>,

    /// Error message from the most recent failure, if any.
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// SharedSnapshot
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`SessionSnapshot`].
///
/// Cheap to clone (`Arc` clone).  Lock with `.lock().unwrap()` for a short
/// critical section; do **not** hold the lock across `.await` points.
pub type SharedSnapshot = Arc<Mutex<SessionSnapshot>>;

/// Construct a new [`SharedSnapshot`] wrapping a default [`SessionSnapshot`].
pub fn new_shared_snapshot() -> SharedSnapshot {
    Arc::new(Mutex::new(SessionSnapshot::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- SessionPhase::is_active ---

    #[test]
    fn idle_is_not_active() {
        assert!(!SessionPhase::Idle.is_active());
    }

    #[test]
    fn arming_is_active() {
        assert!(SessionPhase::Arming.is_active());
    }

    #[test]
    fn live_is_active() {
        assert!(SessionPhase::Live.is_active());
    }

    #[test]
    fn paused_is_active() {
        assert!(SessionPhase::Paused.is_active());
    }

    #[test]
    fn finishing_is_active() {
        assert!(SessionPhase::Finishing.is_active());
    }

    #[test]
    fn saved_is_not_active() {
        assert!(!SessionPhase::Saved.is_active());
    }

    // ---- SessionPhase::is_terminal ---

    #[test]
    fn saved_and_discarded_are_terminal() {
        assert!(SessionPhase::Saved.is_terminal());
        assert!(SessionPhase::Discarded.is_terminal());
        assert!(!SessionPhase::Idle.is_terminal());
        assert!(!SessionPhase::Live.is_terminal());
        assert!(!SessionPhase::Finishing.is_terminal());
    }

    // ---- SessionPhase::label ---

    #[test]
    fn labels() {
        assert_eq!(SessionPhase::Idle.label(), "Idle");
        assert_eq!(SessionPhase::Arming.label(), "Get ready");
        assert_eq!(SessionPhase::Live.label(), "Recording");
        assert_eq!(SessionPhase::Paused.label(), "Paused");
        assert_eq!(SessionPhase::Finishing.label(), "Saving");
        assert_eq!(SessionPhase::Saved.label(), "Saved");
        assert_eq!(SessionPhase::Discarded.label(), "Discarded");
    }

    // ---- Default ---

    #[test]
    fn default_phase_is_idle() {
        assert_eq!(SessionPhase::default(), SessionPhase::Idle);
    }

    // ---- SessionSnapshot / SharedSnapshot ---

    #[test]
    fn default_snapshot_is_empty() {
        let snap = SessionSnapshot::default();
        assert_eq!(snap.phase, SessionPhase::Idle);
        assert!(snap.track_title.is_none());
        assert_eq!(snap.position, Duration::ZERO);
        assert!(snap.countdown.is_none());
        assert!(snap.lyric_index.is_none());
        assert!(snap.error_message.is_none());
    }

    #[test]
    fn shared_snapshot_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedSnapshot>();
    }

    #[test]
    fn shared_snapshot_can_be_cloned_and_mutated() {
        let snap = new_shared_snapshot();
        let snap2 = Arc::clone(&snap);

        snap.lock().unwrap().phase = SessionPhase::Live;
        assert_eq!(snap2.lock().unwrap().phase, SessionPhase::Live);
    }
}
