//! Track metadata — instrumental source, duration, and timed lyric lines.
//!
//! A [`Track`] is built once when the user opens a song for recording and is
//! immutable for the lifetime of the session.  Lyrics arrive from the song
//! metadata service as a JSON array of `{start, end, text}` objects; a parse
//! failure degrades to "no lyrics" rather than blocking the session (the
//! cursor simply never finds an active line).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// LyricLine
// ---------------------------------------------------------------------------

/// One timed lyric line.
///
/// `start` and `end` are seconds from the beginning of the track.  The line
/// is active for `start <= t < end` (end-exclusive).  A well-formed sequence
/// is sorted by `start` with non-overlapping intervals; the cursor tolerates
/// violations by always picking the first match in sequence order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

// ---------------------------------------------------------------------------
// TrackSource
// ---------------------------------------------------------------------------

/// Where the instrumental audio comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackSource {
    /// A local audio file.
    Path(PathBuf),
    /// A streamable HTTP URL served by the processing backend.
    Url(String),
}

// ---------------------------------------------------------------------------
// TrackError
// ---------------------------------------------------------------------------

/// Errors from the media-source collaborator.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("no streamable source available for track {0}")]
    SourceUnavailable(u64),
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

/// An instrumental track opened for a recording session.
///
/// `duration` is `None` until the playback engine has loaded the source;
/// the session controller fills it in and publishes it via the snapshot.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u64,
    pub title: String,
    pub source: TrackSource,
    pub duration: Option<Duration>,
    pub lyrics: Vec<LyricLine>,
}

impl Track {
    /// Build a track from its source and the raw lyrics JSON (if any).
    pub fn new(id: u64, title: impl Into<String>, source: TrackSource, lyrics_json: Option<&str>) -> Self {
        let lyrics = lyrics_json.map(parse_lyrics).unwrap_or_default();
        Self {
            id,
            title: title.into(),
            source,
            duration: None,
            lyrics,
        }
    }
}

// ---------------------------------------------------------------------------
// parse_lyrics
// ---------------------------------------------------------------------------

/// Parse a serialized lyric line list.
///
/// Returns an empty list on malformed input — a missing or broken lyric
/// file must never prevent playback, so this logs a warning instead of
/// returning an error.
pub fn parse_lyrics(json: &str) -> Vec<LyricLine> {
    match serde_json::from_str::<Vec<LyricLine>>(json) {
        Ok(lines) => lines,
        Err(e) => {
            log::warn!("failed to parse lyrics, continuing without: {e}");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// SourceResolver
// ---------------------------------------------------------------------------

/// Resolves a track id to a streamable source.
///
/// Implementors must be `Send + Sync` so they can be shared across threads.
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, track_id: u64) -> Result<TrackSource, TrackError>;
}

/// Resolves tracks against the processing backend's streaming endpoint.
pub struct StreamResolver {
    base_url: String,
}

impl StreamResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl SourceResolver for StreamResolver {
    fn resolve(&self, track_id: u64) -> Result<TrackSource, TrackError> {
        Ok(TrackSource::Url(format!(
            "{}/api/stream/{track_id}/accompaniment",
            self.base_url.trim_end_matches('/')
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
