//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Settings for the instrumental playback engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Output volume applied at session start (0.0 – 1.0).
    pub default_volume: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { default_volume: 1.0 }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Input device name — `None` means the system default.
    pub device: Option<String>,
    /// Smoothing factor for the displayed mic level (0.0 – 0.99); the
    /// fraction of the previous level retained per chunk.
    pub level_decay: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            level_decay: 0.8,
        }
    }
}

// ---------------------------------------------------------------------------
// CountdownConfig
// ---------------------------------------------------------------------------

/// Settings for the arming countdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownConfig {
    /// Number of countdown steps shown before the take starts.
    pub ticks: u32,
    /// Milliseconds between countdown steps.
    pub interval_ms: u64,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            ticks: 3,
            interval_ms: 1_000,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Settings for the session controller itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Display snapshot refresh rate in Hz.  Needs to be at least 10 for
    /// lyric flips to land on the right beat, so the controller raises
    /// lower values to that floor; the default leaves headroom.
    pub tick_hz: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { tick_hz: 20 }
    }
}

// ---------------------------------------------------------------------------
// UploadConfig
// ---------------------------------------------------------------------------

/// Settings for recording persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base URL of the processing backend.
    pub base_url: String,
    /// Maximum seconds to wait for an upload before timing out.
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".into(),
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use karaoke_session::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Instrumental playback settings.
    pub playback: PlaybackConfig,
    /// Microphone capture settings.
    pub capture: CaptureConfig,
    /// Arming countdown settings.
    pub countdown: CountdownConfig,
    /// Session controller settings.
    pub session: SessionConfig,
    /// Recording upload settings.
    pub upload: UploadConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Verify that a default `AppConfig` can be serialised to TOML and
    /// deserialised back without any data loss.
    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.playback.default_volume, loaded.playback.default_volume);
        assert_eq!(original.capture.device, loaded.capture.device);
        assert_eq!(original.capture.level_decay, loaded.capture.level_decay);
        assert_eq!(original.countdown.ticks, loaded.countdown.ticks);
        assert_eq!(original.countdown.interval_ms, loaded.countdown.interval_ms);
        assert_eq!(original.session.tick_hz, loaded.session.tick_hz);
        assert_eq!(original.upload.base_url, loaded.upload.base_url);
        assert_eq!(original.upload.timeout_secs, loaded.upload.timeout_secs);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        let default = AppConfig::default();

        assert_eq!(config.countdown.ticks, default.countdown.ticks);
        assert_eq!(config.upload.base_url, default.upload.base_url);
    }

    /// Verify default values give a 3-2-1 countdown and ≥ 10 Hz snapshots.
    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.countdown.ticks, 3);
        assert_eq!(cfg.countdown.interval_ms, 1_000);
        assert!(cfg.session.tick_hz >= 10);
        assert_eq!(cfg.playback.default_volume, 1.0);
        assert_eq!(cfg.upload.base_url, "http://localhost:5000");
    }

    /// Verify that modified non-default values survive a round trip.
    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.playback.default_volume = 0.5;
        cfg.capture.device = Some("USB Microphone".into());
        cfg.countdown.ticks = 5;
        cfg.countdown.interval_ms = 500;
        cfg.session.tick_hz = 30;
        cfg.upload.base_url = "https://karaoke.example".into();
        cfg.upload.timeout_secs = 120;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.playback.default_volume, 0.5);
        assert_eq!(loaded.capture.device, Some("USB Microphone".into()));
        assert_eq!(loaded.countdown.ticks, 5);
        assert_eq!(loaded.countdown.interval_ms, 500);
        assert_eq!(loaded.session.tick_hz, 30);
        assert_eq!(loaded.upload.base_url, "https://karaoke.example");
        assert_eq!(loaded.upload.timeout_secs, 120);
    }
}
