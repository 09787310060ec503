//! Microphone capture backend via `cpal`.
//!
//! [`CaptureBackend::open`] acquires the hardware and starts streaming
//! [`AudioChunk`]s over an mpsc channel.  The returned [`CaptureStream`] is
//! a RAII guard — dropping it releases the device.
//!
//! `cpal::Stream` is not `Send`, so [`CpalBackend`] builds and owns the
//! stream on a dedicated OS thread; the handle it hands back only carries a
//! stop channel and is freely movable across threads.

use std::sync::mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the capture callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]` at the device's
/// native rate; the take is persisted at that rate, no resampling.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz (e.g. 44100, 48000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors from the capture subsystem.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The platform refused microphone access.  Recoverable — the session
    /// returns to Idle and the user can grant access and retry.
    #[error("microphone access denied")]
    PermissionDenied,

    /// No usable input device, or the device went away.
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),

    /// A lifecycle command arrived in the wrong order (double start,
    /// release without acquire, …).  Rejected with no state change.
    #[error("invalid capture state: {0}")]
    InvalidState(&'static str),

    /// Anything else the audio backend reports.
    #[error("capture backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// CaptureBackend / CaptureStream traits
// ---------------------------------------------------------------------------

/// An open hardware capture stream.  Dropping the value returns the device
/// to the system.
pub trait CaptureStream: Send {}

/// Factory for capture streams, implemented by the real cpal backend and by
/// mocks in tests.
pub trait CaptureBackend: Send + Sync {
    /// Acquire the input device and begin delivering chunks to `tx`.
    fn open(&self, tx: mpsc::Sender<AudioChunk>) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// Real microphone backend on a cpal input device.
pub struct CpalBackend {
    /// Preferred input device name; `None` selects the system default.
    device: Option<String>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self { device: None }
    }

    /// Prefer the named input device, falling back to the default when it
    /// is absent.
    pub fn with_device(device: Option<String>) -> Self {
        Self { device }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the stream-owning thread alive; dropping stops the stream.
struct CpalStream {
    stop_tx: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl CaptureStream for CpalStream {}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        log::debug!("capture: cpal stream released");
    }
}

fn map_build_error(e: cpal::BuildStreamError) -> CaptureError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("device not available".into())
        }
        cpal::BuildStreamError::BackendSpecific { err } => {
            let msg = err.to_string();
            if msg.to_lowercase().contains("permission") || msg.to_lowercase().contains("denied") {
                CaptureError::PermissionDenied
            } else {
                CaptureError::Backend(msg)
            }
        }
        other => CaptureError::Backend(other.to_string()),
    }
}

impl CaptureBackend for CpalBackend {
    fn open(&self, tx: mpsc::Sender<AudioChunk>) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let preferred = self.device.clone();

        // All cpal objects live and die on this thread.
        let join = thread::spawn(move || {
            let build = || -> Result<cpal::Stream, CaptureError> {
                let host = cpal::default_host();
                let device = match &preferred {
                    Some(name) => host
                        .input_devices()
                        .ok()
                        .and_then(|mut devices| {
                            devices.find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                        })
                        .or_else(|| {
                            log::warn!("capture: device {name:?} not found, using default");
                            host.default_input_device()
                        }),
                    None => host.default_input_device(),
                }
                .ok_or_else(|| CaptureError::DeviceUnavailable("no input device".into()))?;

                let supported = device
                    .default_input_config()
                    .map_err(|e| CaptureError::Backend(e.to_string()))?;
                let channels = supported.channels();
                let sample_rate = supported.sample_rate().0;
                let config: cpal::StreamConfig = supported.into();

                let stream = device
                    .build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            let chunk = AudioChunk {
                                samples: data.to_vec(),
                                sample_rate,
                                channels,
                            };
                            // Ignore send errors; the receiver may be gone.
                            let _ = tx.send(chunk);
                        },
                        |err: cpal::StreamError| {
                            log::error!("cpal stream error: {err}");
                        },
                        None, // no timeout
                    )
                    .map_err(map_build_error)?;

                stream
                    .play()
                    .map_err(|e| CaptureError::Backend(e.to_string()))?;
                Ok(stream)
            };

            match build() {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Stream stays alive until the handle is dropped.
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                stop_tx,
                join: Some(join),
            })),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => Err(CaptureError::Backend("capture thread died during setup".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// MockCaptureBackend  (test-only)
// ---------------------------------------------------------------------------

/// In-memory capture backend for tests — no hardware, no threads.
///
/// `push` feeds chunks into whatever stream is currently open, exactly as
/// the cpal callback would.
#[cfg(test)]
pub struct MockCaptureBackend {
    mode: MockMode,
    tx: std::sync::Mutex<Option<mpsc::Sender<AudioChunk>>>,
    opened: std::sync::atomic::AtomicUsize,
    released: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
#[derive(Clone, Copy)]
enum MockMode {
    Ok,
    PermissionDenied,
    DeviceUnavailable,
}

#[cfg(test)]
struct MockStream {
    released: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl CaptureStream for MockStream {}

#[cfg(test)]
impl Drop for MockStream {
    fn drop(&mut self) {
        self.released
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl MockCaptureBackend {
    fn with_mode(mode: MockMode) -> Self {
        Self {
            mode,
            tx: std::sync::Mutex::new(None),
            opened: std::sync::atomic::AtomicUsize::new(0),
            released: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    /// Backend whose `open` always succeeds.
    pub fn ok() -> Self {
        Self::with_mode(MockMode::Ok)
    }

    /// Backend that refuses access, as a platform permission prompt would.
    pub fn denied() -> Self {
        Self::with_mode(MockMode::PermissionDenied)
    }

    /// Backend with no usable input device.
    pub fn unavailable() -> Self {
        Self::with_mode(MockMode::DeviceUnavailable)
    }

    /// Deliver one chunk to the open stream's channel.
    pub fn push(&self, chunk: AudioChunk) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(chunk);
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of streams dropped so far — the device-release count.
    pub fn release_count(&self) -> usize {
        self.released.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl CaptureBackend for MockCaptureBackend {
    fn open(&self, tx: mpsc::Sender<AudioChunk>) -> Result<Box<dyn CaptureStream>, CaptureError> {
        match self.mode {
            MockMode::Ok => {
                self.opened.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                *self.tx.lock().unwrap() = Some(tx);
                Ok(Box::new(MockStream {
                    released: std::sync::Arc::clone(&self.released),
                }))
            }
            MockMode::PermissionDenied => Err(CaptureError::PermissionDenied),
            MockMode::DeviceUnavailable => {
                Err(CaptureError::DeviceUnavailable("no input device".into()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// `AudioChunk` must be `Send` so it can cross thread boundaries.
    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }

    #[test]
    fn capture_stream_handles_are_send() {
        fn assert_send<T: Send + ?Sized>() {}
        assert_send::<Box<dyn CaptureStream>>();
    }

    #[test]
    fn audio_chunk_fields() {
        let chunk = AudioChunk {
            samples: vec![0.0_f32; 512],
            sample_rate: 48_000,
            channels: 2,
        };
        assert_eq!(chunk.samples.len(), 512);
        assert_eq!(chunk.sample_rate, 48_000);
        assert_eq!(chunk.channels, 2);
    }

    #[test]
    fn backend_specific_permission_message_maps_to_permission_denied() {
        let err = map_build_error(cpal::BuildStreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "Operation not permitted: access denied".into(),
            },
        });
        assert!(matches!(err, CaptureError::PermissionDenied));
    }
}
