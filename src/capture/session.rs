//! One microphone-capture lifecycle: acquire → start/pause/resume → stop →
//! release.
//!
//! The session owns the take buffer and the hardware handle.  A dedicated
//! drain thread moves chunks from the backend's channel into the buffer;
//! pause simply gates appends without touching the device, so resume is
//! instant and the device is acquired/released exactly once per take.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use super::backend::{AudioChunk, CaptureBackend, CaptureError, CaptureStream};
use super::buffer::TakeBuffer;
use super::level::LevelMeter;

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Where the capture device is in its acquire/release lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// No device held.
    Released,
    /// Device held, not buffering yet.
    Acquired,
    /// Device held, chunks flowing into the buffer.
    Capturing,
    /// Device held, buffering suspended.
    Paused,
    /// Buffer frozen; device may still be held until `release`.
    Finalized,
}

// ---------------------------------------------------------------------------
// CaptureShared
// ---------------------------------------------------------------------------

/// State shared between the drain thread and the session.
struct CaptureShared {
    buffer: Mutex<TakeBuffer>,
    /// Gates appends; flipped by start/pause/resume/stop.
    capturing: AtomicBool,
    level: Mutex<LevelMeter>,
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// Microphone capture for one recording session.
pub struct CaptureSession {
    backend: Arc<dyn CaptureBackend>,
    stream: Option<Box<dyn CaptureStream>>,
    shared: Arc<CaptureShared>,
    lifecycle: Lifecycle,
    level_decay: f32,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self::with_level_decay(backend, 0.8)
    }

    /// As [`new`](Self::new), with the level meter's smoothing factor from
    /// config.
    pub fn with_level_decay(backend: Arc<dyn CaptureBackend>, level_decay: f32) -> Self {
        Self {
            backend,
            stream: None,
            shared: Arc::new(CaptureShared {
                buffer: Mutex::new(TakeBuffer::new()),
                capturing: AtomicBool::new(false),
                level: Mutex::new(LevelMeter::new(level_decay)),
            }),
            lifecycle: Lifecycle::Released,
            level_decay,
        }
    }

    /// Request microphone access and start the drain thread.
    ///
    /// Must be balanced by exactly one [`release`](Self::release).  A second
    /// `acquire` without an intervening release is rejected with
    /// `InvalidState` and does not touch the existing handle.
    pub fn acquire(&mut self) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Err(CaptureError::InvalidState("device already acquired"));
        }

        let (tx, rx) = mpsc::channel::<AudioChunk>();
        let stream = self.backend.open(tx)?;

        // Fresh shared state per acquire so a previous take's drain thread
        // (still unwinding) can never write into the new buffer.
        let shared = Arc::new(CaptureShared {
            buffer: Mutex::new(TakeBuffer::new()),
            capturing: AtomicBool::new(false),
            level: Mutex::new(LevelMeter::new(self.level_decay)),
        });

        let drain_shared = Arc::clone(&shared);
        thread::spawn(move || {
            // Ends when every chunk sender is dropped.
            while let Ok(chunk) = rx.recv() {
                if let Ok(mut meter) = drain_shared.level.lock() {
                    meter.update(&chunk.samples);
                }
                if drain_shared.capturing.load(Ordering::Acquire) {
                    if let Ok(mut buf) = drain_shared.buffer.lock() {
                        buf.append(chunk);
                    }
                }
            }
            log::debug!("capture: drain thread finished");
        });

        self.shared = shared;
        self.stream = Some(stream);
        self.lifecycle = Lifecycle::Acquired;
        log::info!("capture: device acquired");
        Ok(())
    }

    /// Begin buffering.  Requires a prior successful `acquire`; a second
    /// `start` is rejected.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.lifecycle != Lifecycle::Acquired {
            return Err(CaptureError::InvalidState(
                "start requires an acquired, not-yet-started device",
            ));
        }
        self.shared.capturing.store(true, Ordering::Release);
        self.lifecycle = Lifecycle::Capturing;
        Ok(())
    }

    /// Suspend buffering without releasing the device.
    pub fn pause(&mut self) -> Result<(), CaptureError> {
        if self.lifecycle != Lifecycle::Capturing {
            return Err(CaptureError::InvalidState("pause requires active capture"));
        }
        self.shared.capturing.store(false, Ordering::Release);
        self.lifecycle = Lifecycle::Paused;
        Ok(())
    }

    /// Resume buffering after a pause.
    pub fn resume(&mut self) -> Result<(), CaptureError> {
        if self.lifecycle != Lifecycle::Paused {
            return Err(CaptureError::InvalidState("resume requires paused capture"));
        }
        self.shared.capturing.store(true, Ordering::Release);
        self.lifecycle = Lifecycle::Capturing;
        Ok(())
    }

    /// Finalize buffering; the buffer is immutable from here on.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        if !matches!(self.lifecycle, Lifecycle::Capturing | Lifecycle::Paused) {
            return Err(CaptureError::InvalidState("stop requires started capture"));
        }
        self.shared.capturing.store(false, Ordering::Release);
        self.lifecycle = Lifecycle::Finalized;
        log::info!(
            "capture: finalized take, {:.1}s buffered",
            self.shared
                .buffer
                .lock()
                .map(|b| b.duration_secs())
                .unwrap_or(0.0)
        );
        Ok(())
    }

    /// WAV payload of the finalized take.
    pub fn frozen_wav(&self) -> Result<Vec<u8>, CaptureError> {
        if self.lifecycle != Lifecycle::Finalized {
            return Err(CaptureError::InvalidState("take is not finalized"));
        }
        let buf = self
            .shared
            .buffer
            .lock()
            .map_err(|_| CaptureError::Backend("buffer lock poisoned".into()))?;
        Ok(buf.to_wav())
    }

    /// Throw away everything buffered so far (finish-and-discard).
    pub fn discard(&mut self) {
        self.shared.capturing.store(false, Ordering::Release);
        if let Ok(mut buf) = self.shared.buffer.lock() {
            buf.clear();
        }
    }

    /// Return the device to the system.
    ///
    /// Exactly once per successful `acquire`, on every exit path.  A second
    /// call is rejected with `InvalidState` — the handle is already gone,
    /// nothing is double-freed.
    pub fn release(&mut self) -> Result<(), CaptureError> {
        let Some(stream) = self.stream.take() else {
            return Err(CaptureError::InvalidState("device already released"));
        };
        self.shared.capturing.store(false, Ordering::Release);
        drop(stream);
        self.lifecycle = Lifecycle::Released;
        log::info!("capture: device released");
        Ok(())
    }

    /// `true` while the device handle is held.
    pub fn is_acquired(&self) -> bool {
        self.stream.is_some()
    }

    /// `true` while chunks are being appended to the buffer.
    pub fn is_capturing(&self) -> bool {
        self.lifecycle == Lifecycle::Capturing
    }

    /// Smoothed microphone amplitude for the display snapshot.
    pub fn level(&self) -> f32 {
        self.shared.level.lock().map(|m| m.level()).unwrap_or(0.0)
    }

    /// Interleaved samples buffered so far.
    pub fn buffered_samples(&self) -> usize {
        self.shared.buffer.lock().map(|b| b.sample_count()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::super::backend::MockCaptureBackend;
    use super::*;
    use std::time::Duration;

    fn chunk(samples: Vec<f32>) -> AudioChunk {
        AudioChunk {
            samples,
            sample_rate: 48_000,
            channels: 1,
        }
    }

    /// Give the drain thread a moment to pick up in-flight chunks.
    fn settle() {
        thread::sleep(Duration::from_millis(60));
    }

    #[test]
    fn full_lifecycle_buffers_only_while_capturing() {
        let backend = Arc::new(MockCaptureBackend::ok());
        let mut session = CaptureSession::new(Arc::clone(&backend) as Arc<dyn CaptureBackend>);

        session.acquire().expect("acquire");
        // Chunks before start() must not land in the buffer.
        backend.push(chunk(vec![0.5; 100]));
        settle();
        assert_eq!(session.buffered_samples(), 0);

        session.start().expect("start");
        backend.push(chunk(vec![0.5; 100]));
        settle();
        assert_eq!(session.buffered_samples(), 100);

        session.pause().expect("pause");
        backend.push(chunk(vec![0.5; 100]));
        settle();
        assert_eq!(session.buffered_samples(), 100);

        session.resume().expect("resume");
        backend.push(chunk(vec![0.5; 100]));
        settle();
        assert_eq!(session.buffered_samples(), 200);

        session.stop().expect("stop");
        let wav = session.frozen_wav().expect("wav");
        assert_eq!(wav.len(), 44 + 200 * 2);

        session.release().expect("release");
        assert!(!session.is_acquired());
    }

    #[test]
    fn start_without_acquire_is_invalid() {
        let backend = Arc::new(MockCaptureBackend::ok());
        let mut session = CaptureSession::new(backend);
        assert!(matches!(
            session.start(),
            Err(CaptureError::InvalidState(_))
        ));
    }

    #[test]
    fn double_start_is_invalid() {
        let backend = Arc::new(MockCaptureBackend::ok());
        let mut session = CaptureSession::new(backend);
        session.acquire().expect("acquire");
        session.start().expect("start");
        assert!(matches!(
            session.start(),
            Err(CaptureError::InvalidState(_))
        ));
        // No state change: still capturing.
        assert!(session.is_capturing());
    }

    #[test]
    fn double_acquire_is_invalid_and_keeps_first_handle() {
        let backend = Arc::new(MockCaptureBackend::ok());
        let mut session = CaptureSession::new(Arc::clone(&backend) as Arc<dyn CaptureBackend>);

        session.acquire().expect("first acquire");
        assert!(matches!(
            session.acquire(),
            Err(CaptureError::InvalidState(_))
        ));
        assert_eq!(backend.open_count(), 1);
        assert!(session.is_acquired());
    }

    #[test]
    fn double_release_is_invalid_without_double_free() {
        let backend = Arc::new(MockCaptureBackend::ok());
        let mut session = CaptureSession::new(Arc::clone(&backend) as Arc<dyn CaptureBackend>);

        session.acquire().expect("acquire");
        session.release().expect("first release");
        assert!(matches!(
            session.release(),
            Err(CaptureError::InvalidState(_))
        ));
        assert_eq!(backend.release_count(), 1);
    }

    #[test]
    fn acquire_maps_backend_denial() {
        let backend = Arc::new(MockCaptureBackend::denied());
        let mut session = CaptureSession::new(backend);
        assert!(matches!(
            session.acquire(),
            Err(CaptureError::PermissionDenied)
        ));
        assert!(!session.is_acquired());
    }

    #[test]
    fn discard_clears_buffer() {
        let backend = Arc::new(MockCaptureBackend::ok());
        let mut session = CaptureSession::new(Arc::clone(&backend) as Arc<dyn CaptureBackend>);

        session.acquire().expect("acquire");
        session.start().expect("start");
        backend.push(chunk(vec![0.5; 100]));
        settle();
        session.stop().expect("stop");

        session.discard();
        assert_eq!(session.buffered_samples(), 0);
        session.release().expect("release");
    }

    #[test]
    fn level_updates_even_before_start() {
        let backend = Arc::new(MockCaptureBackend::ok());
        let mut session = CaptureSession::new(Arc::clone(&backend) as Arc<dyn CaptureBackend>);

        session.acquire().expect("acquire");
        backend.push(chunk(vec![0.5; 1_000]));
        settle();
        assert!(session.level() > 0.4);
        session.release().expect("release");
    }

    #[test]
    fn frozen_wav_before_stop_is_invalid() {
        let backend = Arc::new(MockCaptureBackend::ok());
        let mut session = CaptureSession::new(backend);
        session.acquire().expect("acquire");
        session.start().expect("start");
        assert!(matches!(
            session.frozen_wav(),
            Err(CaptureError::InvalidState(_))
        ));
    }

    #[test]
    fn reacquire_after_release_starts_a_fresh_buffer() {
        let backend = Arc::new(MockCaptureBackend::ok());
        let mut session = CaptureSession::new(Arc::clone(&backend) as Arc<dyn CaptureBackend>);

        session.acquire().expect("acquire");
        session.start().expect("start");
        backend.push(chunk(vec![0.5; 100]));
        settle();
        session.stop().expect("stop");
        session.release().expect("release");

        session.acquire().expect("re-acquire");
        assert_eq!(session.buffered_samples(), 0);
        assert_eq!(backend.open_count(), 2);
        session.release().expect("release");
    }
}
