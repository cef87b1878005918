//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Sections missing from `settings.toml` fall back to their defaults.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Wire sample rate of captured microphone audio (mono, signed 16-bit).
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized audio delivered by the remote model.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Per-session settings, supplied once at session start.
///
/// The controller clones this into an `Arc` when a session starts; changing
/// the application config afterwards never affects a running session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// System instruction sent to the remote model during setup.
    pub system_instruction: String,
    /// Tool names the remote model may call during this session.
    pub enabled_tools: Vec<String>,
    /// Redact emails, phone numbers, card numbers and API keys from model
    /// turns before they reach the transcript sink.
    pub privacy_mode: bool,
    /// Samples per outbound capture chunk (4096 ≈ 256 ms at 16 kHz).
    pub chunk_samples: usize,
}

impl SessionConfig {
    /// Returns `true` when `name` is in the enabled tool list.
    pub fn tool_enabled(&self, name: &str) -> bool {
        self.enabled_tools.iter().any(|t| t == name)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_instruction: "You are a helpful voice assistant. Keep answers short and \
                                 conversational."
                .into(),
            enabled_tools: vec![
                "make_call".into(),
                "send_sms".into(),
                "toggle_phone_setting".into(),
                "generate_image".into(),
                "generate_video".into(),
            ],
            privacy_mode: false,
            chunk_samples: 4096,
        }
    }
}

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

/// Connection settings for the duplex session channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Bearer token — `None` for local endpoints that need no auth.
    pub api_key: Option<String>,
    /// Maximum seconds to wait for the handshake to complete.
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8765/v1/session".into(),
            api_key: None,
            connect_timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// MediaConfig
// ---------------------------------------------------------------------------

/// When an image request should be retried against the keyless provider.
///
/// A failure qualifies when its HTTP status is listed in `statuses`, or when
/// its message contains any of `triggers` (case-insensitive).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    /// Base URL of the keyless image provider.
    pub base_url: String,
    pub statuses: Vec<u16>,
    pub triggers: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://image.pollinations.ai".into(),
            statuses: vec![429],
            triggers: vec![
                "quota".into(),
                "rate limit".into(),
                "resource_exhausted".into(),
            ],
        }
    }
}

/// Settings for the image/video generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Base URL of an OpenAI-compatible media API.
    pub base_url: String,
    pub api_key: Option<String>,
    pub image_model: String,
    pub video_model: String,
    /// Generation is slow; this bounds a single request.
    pub timeout_secs: u64,
    pub fallback: FallbackConfig,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            image_model: "gpt-image-1".into(),
            video_model: "sora-2".into(),
            timeout_secs: 120,
            fallback: FallbackConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Audio device selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name — `None` means the system default.
    pub input_device: Option<String>,
    /// Output device name — `None` means the system default.
    pub output_device: Option<String>,
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_session::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// assert_eq!(config.session.chunk_samples, 4096);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub transport: TransportConfig,
    pub media: MediaConfig,
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
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
