//! `MediaService` — the [`MediaGenerator`] used by the tool executor.
//!
//! Wraps a primary [`MediaBackend`] and, for images only, retries once on a
//! keyless backend when the primary failure matches the configured
//! [`FallbackPolicy`] (quota / rate-limit). Every outcome, good or bad, is
//! turned into a [`MediaResult`]; this type never returns an error.

use async_trait::async_trait;

use super::{
    ApiMediaBackend, AspectRatio, KeylessImageBackend, MediaBackend, MediaError, MediaGenerator,
    MediaKind, MediaResult,
};
use crate::config::{FallbackConfig, MediaConfig};

// ---------------------------------------------------------------------------
// FallbackPolicy
// ---------------------------------------------------------------------------

/// Decides whether a primary failure counts as a quota error.
#[derive(Debug, Clone, Default)]
pub struct FallbackPolicy {
    statuses: Vec<u16>,
    /// Lower-cased substrings matched against the error text.
    triggers: Vec<String>,
}

impl FallbackPolicy {
    pub fn from_config(config: &FallbackConfig) -> Self {
        Self {
            statuses: config.statuses.clone(),
            triggers: config
                .triggers
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// A policy that never falls back.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn should_fall_back(&self, err: &MediaError) -> bool {
        if let MediaError::Status { code, .. } = err {
            if self.statuses.contains(code) {
                return true;
            }
        }
        let text = err.to_string().to_lowercase();
        self.triggers.iter().any(|t| text.contains(t.as_str()))
    }
}

// ---------------------------------------------------------------------------
// MediaService
// ---------------------------------------------------------------------------

/// Primary backend plus an optional once-only image fallback.
///
/// # Example
/// ```rust
/// use voice_session::config::MediaConfig;
/// use voice_session::media::MediaService;
///
/// let media = MediaService::from_config(&MediaConfig::default());
/// // `media` implements MediaGenerator and never returns an error.
/// ```
pub struct MediaService {
    primary: Box<dyn MediaBackend>,
    fallback: Option<Box<dyn MediaBackend>>,
    policy: FallbackPolicy,
}

impl MediaService {
    pub fn new(primary: impl MediaBackend + 'static) -> Self {
        Self {
            primary: Box::new(primary),
            fallback: None,
            policy: FallbackPolicy::never(),
        }
    }

    /// Retry qualifying image failures once on `backend`.
    pub fn with_fallback(mut self, backend: impl MediaBackend + 'static, policy: FallbackPolicy) -> Self {
        self.fallback = Some(Box::new(backend));
        self.policy = policy;
        self
    }

    /// API backend, plus the keyless image provider when
    /// `config.fallback.enabled`.
    pub fn from_config(config: &MediaConfig) -> Self {
        let service = Self::new(ApiMediaBackend::from_config(config));
        if config.fallback.enabled {
            service.with_fallback(
                KeylessImageBackend::new(config.fallback.base_url.clone()),
                FallbackPolicy::from_config(&config.fallback),
            )
        } else {
            service
        }
    }
}

#[async_trait]
impl MediaGenerator for MediaService {
    async fn generate_image(&self, prompt: &str, aspect_ratio: &str) -> MediaResult {
        let aspect = AspectRatio::parse(aspect_ratio);
        let outcome = match self.primary.image(prompt, aspect).await {
            Err(err) if self.policy.should_fall_back(&err) => match &self.fallback {
                Some(fallback) => {
                    log::warn!("media: primary image provider refused ({err}), using keyless fallback");
                    fallback.image(prompt, aspect).await
                }
                None => Err(err),
            },
            other => other,
        };
        if let Err(e) = &outcome {
            log::warn!("media: image generation failed: {e}");
        }
        MediaResult::from_outcome(MediaKind::Image, outcome)
    }

    async fn generate_video(&self, prompt: &str, aspect_ratio: &str) -> MediaResult {
        let outcome = self.primary.video(prompt, AspectRatio::parse(aspect_ratio)).await;
        if let Err(e) = &outcome {
            log::warn!("media: video generation failed: {e}");
        }
        MediaResult::from_outcome(MediaKind::Video, outcome)
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Generator that records prompts and answers with a fixed result.
#[cfg(test)]
pub struct StubMedia {
    pub result: MediaResult,
    pub delay: std::time::Duration,
    pub prompts: std::sync::Mutex<Vec<(MediaKind, String, String)>>,
}

#[cfg(test)]
impl StubMedia {
    pub fn new(result: MediaResult) -> Self {
        Self {
            result,
            delay: std::time::Duration::ZERO,
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    async fn answer(&self, kind: MediaKind, prompt: &str, aspect_ratio: &str) -> MediaResult {
        self.prompts
            .lock()
            .unwrap()
            .push((kind, prompt.into(), aspect_ratio.into()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl MediaGenerator for StubMedia {
    async fn generate_image(&self, prompt: &str, aspect_ratio: &str) -> MediaResult {
        self.answer(MediaKind::Image, prompt, aspect_ratio).await
    }

    async fn generate_video(&self, prompt: &str, aspect_ratio: &str) -> MediaResult {
        self.answer(MediaKind::Video, prompt, aspect_ratio).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
