//! Recording persistence — the [`RecordingUploader`] submit contract and
//! its HTTP implementation.
//!
//! The core hands a finished [`Take`] to the uploader and forgets the
//! payload on success.  Failures keep the take buffered in the session so
//! the user can retry; idempotency of a retried submit is the server's
//! concern, not guaranteed here.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::UploadConfig;

// ---------------------------------------------------------------------------
// Take
// ---------------------------------------------------------------------------

/// One finalized, immutable captured audio artifact.
#[derive(Debug, Clone)]
pub struct Take {
    /// The track this take was sung over.
    pub track_id: u64,
    /// Encoded audio (WAV).
    pub payload: Vec<u8>,
    pub created_at: SystemTime,
}

impl Take {
    pub fn new(track_id: u64, payload: Vec<u8>) -> Self {
        Self {
            track_id,
            payload,
            created_at: SystemTime::now(),
        }
    }

    /// Upload filename, unique per take via the creation timestamp.
    pub fn file_name(&self) -> String {
        let ts = self
            .created_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("recording_{}_{}.wav", self.track_id, ts)
    }
}

/// Identifier of a persisted recording.  Server-assigned when the backend
/// returns one; otherwise the client-side take filename stands in.
pub type ArtifactId = String;

// ---------------------------------------------------------------------------
// UploadError
// ---------------------------------------------------------------------------

/// Errors from the submit step.  Never fatal to the session — the take
/// stays buffered and a retry is offered.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Request(String),

    #[error("upload timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("server rejected the recording: HTTP {0}")]
    Rejected(u16),

    #[error("failed to parse upload response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UploadError::Timeout
        } else {
            UploadError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingUploader trait
// ---------------------------------------------------------------------------

/// Async submit contract for finished takes.
///
/// Implementors must be `Send + Sync` so the session controller can run
/// the submit step on a background task while staying responsive.
#[async_trait]
pub trait RecordingUploader: Send + Sync {
    async fn submit(&self, take: &Take) -> Result<ArtifactId, UploadError>;
}

// ---------------------------------------------------------------------------
// HttpUploader
// ---------------------------------------------------------------------------

/// Posts takes to the processing backend's `/api/recordings` endpoint as
/// a multipart form (`file` + `song_id`), matching the gallery's upload
/// contract.
pub struct HttpUploader {
    client: reqwest::Client,
    config: UploadConfig,
}

impl HttpUploader {
    /// Build an `HttpUploader` from application config.
    ///
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.timeout_secs`.
    pub fn from_config(config: &UploadConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl RecordingUploader for HttpUploader {
    async fn submit(&self, take: &Take) -> Result<ArtifactId, UploadError> {
        let url = format!(
            "{}/api/recordings",
            self.config.base_url.trim_end_matches('/')
        );

        let part = reqwest::multipart::Part::bytes(take.payload.clone())
            .file_name(take.file_name())
            .mime_str("audio/wav")
            .map_err(|e| UploadError::Request(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("song_id", take.track_id.to_string());

        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected(status.as_u16()));
        }

        // The backend acknowledges with {"message": "Recording saved"} and
        // only sometimes an id; tolerate both shapes.
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UploadError::Parse(e.to_string()))?;
        Ok(json["id"]
            .as_u64()
            .map(|v| v.to_string())
            .unwrap_or_else(|| take.file_name()))
    }
}

// ---------------------------------------------------------------------------
// MockUploader  (test-only)
// ---------------------------------------------------------------------------

/// Scripted uploader for tests: fails the first `fail_times` submits, then
/// succeeds, recording every payload it accepted.
#[cfg(test)]
pub struct MockUploader {
    fail_times: std::sync::atomic::AtomicUsize,
    pub accepted: std::sync::Mutex<Vec<Take>>,
}

#[cfg(test)]
impl MockUploader {
    pub fn ok() -> Self {
        Self::failing(0)
    }

    pub fn failing(fail_times: usize) -> Self {
        Self {
            fail_times: std::sync::atomic::AtomicUsize::new(fail_times),
            accepted: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl RecordingUploader for MockUploader {
    async fn submit(&self, take: &Take) -> Result<ArtifactId, UploadError> {
        use std::sync::atomic::Ordering;
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(UploadError::Request("connection refused".into()));
        }
        let mut accepted = self.accepted.lock().unwrap();
        accepted.push(take.clone());
        Ok(take.file_name())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
