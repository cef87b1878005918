//! Where `settings.toml` lives.
//!
//! `VOICE_SESSION_CONFIG_DIR` overrides the platform default:
//!   Windows: %APPDATA%\voice-session\
//!   macOS:   ~/Library/Application Support/voice-session/
//!   Linux:   ~/.config/voice-session/

use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config directory.
pub const CONFIG_DIR_ENV: &str = "VOICE_SESSION_CONFIG_DIR";

/// Resolved configuration paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-session";

    /// Honour [`CONFIG_DIR_ENV`] when set and non-empty, else the platform
    /// config dir (or the current directory when there is none).
    pub fn new() -> Self {
        match std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
            Some(dir) => Self::within(dir),
            None => Self::within(
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(Self::APP_NAME),
            ),
        }
    }

    /// Paths rooted at an explicit directory.
    pub fn within(dir: impl AsRef<Path>) -> Self {
        let config_dir = dir.as_ref().to_path_buf();
        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
