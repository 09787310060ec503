//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\karaoke-session\
//!   macOS:   ~/Library/Application Support/karaoke-session/
//!   Linux:   ~/.config/karaoke-session/
//!
//! Data dir (downloaded accompaniment cache):
//!   Windows: %LOCALAPPDATA%\karaoke-session\
//!   macOS:   ~/Library/Application Support/karaoke-session/
//!   Linux:   ~/.local/share/karaoke-session/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for accompaniment files downloaded from the backend.
    pub media_cache_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "karaoke-session";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let media_cache_dir = data_dir.join("media");

        Self {
            config_dir,
            settings_file,
            media_cache_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
