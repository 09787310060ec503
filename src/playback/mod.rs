//! Instrumental playback — the [`PlaybackClock`] contract and its rodio
//! implementation.
//!
//! The session controller is the only caller.  It observes elapsed time by
//! polling [`PlaybackClock::position`] from its display ticker (≥ 10 Hz) and
//! detects end-of-track via [`PlaybackClock::is_finished`]; there is no
//! callback surface, which keeps every transition on the controller's single
//! timeline.
//!
//! [`PlaybackClock::prime_output`] exists because some audio backends refuse
//! to start playback outside a direct user gesture: the workaround is to
//! play and immediately pause once during arming.  Implementations without
//! that restriction may no-op it.

pub mod rodio_clock;

pub use rodio_clock::RodioClock;

use std::time::Duration;

use thiserror::Error;

use crate::track::TrackSource;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Errors from the playback engine.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// A transport command was issued before a successful `load`.
    #[error("playback engine not ready: no source loaded")]
    NotReady,

    #[error("audio output device error: {0}")]
    Device(String),

    #[error("failed to decode audio source: {0}")]
    Decode(String),

    #[error("seek failed: {0}")]
    Seek(String),

    /// The implementation cannot play this kind of source.
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// PlaybackClock trait
// ---------------------------------------------------------------------------

/// One audio source with transport controls and a monotonic position.
///
/// All methods are synchronous and non-blocking so the Arming → Live
/// transition can issue `play()` back-to-back with the capture start,
/// without a suspension point in between.
///
/// Not required to be `Send`: real implementations own platform audio
/// handles that must stay on the thread that created them, so the session
/// controller runs on one thread via `Runtime::block_on` rather than
/// `tokio::spawn`.
pub trait PlaybackClock {
    /// Load the source.  Returns the duration when the container reports
    /// one.  Must be called before any transport command.
    fn load(&mut self, source: &TrackSource) -> Result<Option<Duration>, PlaybackError>;

    /// Play-then-pause warm-up ritual for autoplay-gated backends.
    /// No-op where the platform imposes no such restriction.
    fn prime_output(&mut self) -> Result<(), PlaybackError>;

    /// Start or resume playback.  `NotReady` before `load`.
    fn play(&mut self) -> Result<(), PlaybackError>;

    /// Pause, keeping the current position.
    fn pause(&mut self) -> Result<(), PlaybackError>;

    /// Halt and reset the position to zero.
    fn stop(&mut self) -> Result<(), PlaybackError>;

    fn seek(&mut self, position: Duration) -> Result<(), PlaybackError>;

    /// Output volume; values are clamped to `[0.0, 1.0]`.
    fn set_volume(&mut self, volume: f32);

    /// Elapsed playback time.  Zero before `load`.
    fn position(&self) -> Duration;

    /// Duration reported at `load`, if known.
    fn duration(&self) -> Option<Duration>;

    /// `true` once playback has reached the end of the source.
    fn is_finished(&self) -> bool;
}

// ---------------------------------------------------------------------------
// MockClock (test-only)
// ---------------------------------------------------------------------------

/// Mock playback clock that records every transport call in order.
///
/// The call log and the end-of-track flag are shared handles so a test can
/// inspect and steer the clock after handing it to the session controller.
#[cfg(test)]
pub struct MockClock {
    calls: std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>,
    finished: std::sync::Arc<std::sync::atomic::AtomicBool>,
    reported_duration: Option<Duration>,
    loaded: bool,
    position: Duration,
}

#[cfg(test)]
impl MockClock {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
            finished: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            reported_duration: Some(Duration::from_secs(180)),
            loaded: false,
            position: Duration::ZERO,
        }
    }

    /// Shared handle to the ordered call log.
    pub fn calls(&self) -> std::sync::Arc<std::sync::Mutex<Vec<&'static str>>> {
        std::sync::Arc::clone(&self.calls)
    }

    /// Shared flag a test flips to simulate the track reaching its end.
    pub fn finish_flag(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        std::sync::Arc::clone(&self.finished)
    }

    fn log(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[cfg(test)]
impl PlaybackClock for MockClock {
    fn load(&mut self, _source: &TrackSource) -> Result<Option<Duration>, PlaybackError> {
        self.log("load");
        self.loaded = true;
        Ok(self.reported_duration)
    }

    fn prime_output(&mut self) -> Result<(), PlaybackError> {
        self.log("prime");
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        if !self.loaded {
            return Err(PlaybackError::NotReady);
        }
        self.log("play");
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        self.log("pause");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlaybackError> {
        self.log("stop");
        self.position = Duration::ZERO;
        self.finished
            .store(false, std::sync::atomic::Ordering::Release);
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<(), PlaybackError> {
        if !self.loaded {
            return Err(PlaybackError::NotReady);
        }
        self.log("seek");
        self.position = position;
        Ok(())
    }

    fn set_volume(&mut self, _volume: f32) {}

    fn position(&self) -> Duration {
        self.position
    }

    fn duration(&self) -> Option<Duration> {
        if self.loaded {
            self.reported_duration
        } else {
            None
        }
    }

    fn is_finished(&self) -> bool {
        self.finished.load(std::sync::atomic::Ordering::Acquire)
    }
}
