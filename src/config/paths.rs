//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\stream-tts\
//!   macOS:   ~/Library/Application Support/stream-tts/
//!   Linux:   ~/.config/stream-tts/
//!
//! Data dir (history logs):
//!   Windows: %LOCALAPPDATA%\stream-tts\
//!   macOS:   ~/Library/Application Support/stream-tts/
//!   Linux:   ~/.local/share/stream-tts/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for the daily `tts-history-*.jsonl` files.
    pub history_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "stream-tts";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let history_dir = data_dir.join("logs");

        Self {
            config_dir,
            settings_file,
            history_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
