//! Media Generator: one-shot prompt → image/video URL.
//!
//! This module provides:
//! * [`MediaGenerator`] — the contract the tool executor calls. Never fails
//!   outward; reports `{success, detail}` via [`MediaResult`].
//! * [`MediaBackend`] — a single provider that may fail with [`MediaError`].
//! * [`ApiMediaBackend`] — OpenAI-compatible images / videos endpoints.
//! * [`KeylessImageBackend`] — public keyless image provider (no video).
//! * [`MediaService`] — primary backend plus a once-only image fallback
//!   governed by [`FallbackPolicy`].
//!
//! ```text
//! generate_image ──▶ primary ──Err(quota)──▶ keyless ──▶ MediaResult
//!                        └──── Ok / other Err ─────────▶ MediaResult
//! ```

pub mod api;
pub mod fallback;
pub mod keyless;

use async_trait::async_trait;
use thiserror::Error;

pub use api::ApiMediaBackend;
pub use fallback::{FallbackPolicy, MediaService};
pub use keyless::KeylessImageBackend;

// ---------------------------------------------------------------------------
// MediaError
// ---------------------------------------------------------------------------

/// Errors a single media backend can report.
#[derive(Debug, Error)]
pub enum MediaError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("provider returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("media request timed out")]
    Timeout,

    #[error("failed to parse provider response: {0}")]
    Parse(String),

    #[error("provider returned no media")]
    EmptyResponse,

    /// The provider accepted the job but reported that generation failed.
    #[error("generation failed: {0}")]
    Failed(String),

    #[error("{0} generation is not supported by this provider")]
    Unsupported(MediaKind),
}

impl From<reqwest::Error> for MediaError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MediaError::Timeout
        } else {
            MediaError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        })
    }
}

/// Requested frame shape. Unrecognised ratios fall back to square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Landscape,
    Portrait,
    Classic,
    ClassicPortrait,
}

impl AspectRatio {
    /// Parse `"16:9"`-style ratios.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "16:9" => AspectRatio::Landscape,
            "9:16" => AspectRatio::Portrait,
            "4:3" => AspectRatio::Classic,
            "3:4" => AspectRatio::ClassicPortrait,
            _ => AspectRatio::Square,
        }
    }

    /// Pixel dimensions `(width, height)` requested from providers.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1024, 1024),
            AspectRatio::Landscape => (1280, 720),
            AspectRatio::Portrait => (720, 1280),
            AspectRatio::Classic => (1024, 768),
            AspectRatio::ClassicPortrait => (768, 1024),
        }
    }

    /// `"WxH"` size string.
    pub fn size(self) -> String {
        let (w, h) = self.dimensions();
        format!("{w}x{h}")
    }
}

/// Outcome of a generation request, relayed to the remote model as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaResult {
    pub success: bool,
    pub detail: String,
}

impl MediaResult {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }

    /// Build the relayed result for a finished backend call.
    pub fn from_outcome(kind: MediaKind, outcome: Result<String, MediaError>) -> Self {
        match outcome {
            Ok(url) => Self::ok(format!("Generated {kind}: {url}")),
            Err(e) => Self::failed(format!("Failed to generate {kind}: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Long-running, asynchronous media generation that reports failure in
/// the result instead of raising.
#[async_trait]
pub trait MediaGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str, aspect_ratio: &str) -> MediaResult;
    async fn generate_video(&self, prompt: &str, aspect_ratio: &str) -> MediaResult;
}

/// One media provider. Returns the URL of the generated asset.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn image(&self, prompt: &str, aspect: AspectRatio) -> Result<String, MediaError>;
    async fn video(&self, prompt: &str, aspect: AspectRatio) -> Result<String, MediaError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_mapping() {
        assert_eq!(AspectRatio::parse("16:9").dimensions(), (1280, 720));
        assert_eq!(AspectRatio::parse(" 9:16 ").dimensions(), (720, 1280));
        assert_eq!(AspectRatio::parse("4:3").size(), "1024x768");
        assert_eq!(AspectRatio::parse("3:4").size(), "768x1024");
        assert_eq!(AspectRatio::parse("1:1"), AspectRatio::Square);
        assert_eq!(AspectRatio::parse("cinemascope"), AspectRatio::Square);
    }

    #[test]
    fn outcome_rendering() {
        let ok = MediaResult::from_outcome(MediaKind::Image, Ok("https://x/y.png".into()));
        assert!(ok.success);
        assert_eq!(ok.detail, "Generated image: https://x/y.png");

        let err = MediaResult::from_outcome(MediaKind::Video, Err(MediaError::Timeout));
        assert!(!err.success);
        assert_eq!(err.detail, "Failed to generate video: media request timed out");
    }

    #[test]
    fn unsupported_names_the_kind() {
        let e = MediaError::Unsupported(MediaKind::Video);
        assert_eq!(e.to_string(), "video generation is not supported by this provider");
    }
}
