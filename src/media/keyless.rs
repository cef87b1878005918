//! Keyless public image provider.
//!
//! The provider renders on first fetch, so "generating" an image is just
//! building its URL: `{base}/prompt/{prompt}?width=W&height=H&nologo=true`.
//! Video is not offered.

use async_trait::async_trait;
use reqwest::Url;

use super::{AspectRatio, MediaBackend, MediaError, MediaKind};

#[derive(Debug, Clone)]
pub struct KeylessImageBackend {
    base_url: String,
}

impl KeylessImageBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// URL that renders `prompt` at the requested aspect ratio.
    ///
    /// # Errors
    ///
    /// [`MediaError::Request`] when the configured base URL is unusable.
    pub fn image_url(&self, prompt: &str, aspect: AspectRatio) -> Result<String, MediaError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| MediaError::Request(e.to_string()))?;
        let (width, height) = aspect.dimensions();

        url.path_segments_mut()
            .map_err(|_| MediaError::Request(format!("'{}' cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push("prompt")
            .push(prompt);
        url.query_pairs_mut()
            .append_pair("width", &width.to_string())
            .append_pair("height", &height.to_string())
            .append_pair("nologo", "true");

        Ok(url.into())
    }
}

#[async_trait]
impl MediaBackend for KeylessImageBackend {
    async fn image(&self, prompt: &str, aspect: AspectRatio) -> Result<String, MediaError> {
        self.image_url(prompt, aspect)
    }

    async fn video(&self, _prompt: &str, _aspect: AspectRatio) -> Result<String, MediaError> {
        Err(MediaError::Unsupported(MediaKind::Video))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_encoded_prompt_url() {
        let backend = KeylessImageBackend::new("https://image.pollinations.ai");
        let url = backend.image_url("a red fox", AspectRatio::Landscape).unwrap();
        assert_eq!(
            url,
            "https://image.pollinations.ai/prompt/a%20red%20fox?width=1280&height=720&nologo=true"
        );
    }

    #[test]
    fn slash_in_prompt_stays_in_one_segment() {
        let backend = KeylessImageBackend::new("https://image.pollinations.ai/");
        let url = backend.image_url("cats/dogs", AspectRatio::Square).unwrap();
        assert!(url.starts_with("https://image.pollinations.ai/prompt/cats%2Fdogs?"));
    }

    #[test]
    fn bad_base_url_is_an_error() {
        let backend = KeylessImageBackend::new("not a url");
        assert!(matches!(
            backend.image_url("x", AspectRatio::Square),
            Err(MediaError::Request(_))
        ));
    }

    #[tokio::test]
    async fn video_is_unsupported() {
        let backend = KeylessImageBackend::new("https://image.pollinations.ai");
        let err = backend.video("x", AspectRatio::Square).await.unwrap_err();
        assert!(matches!(err, MediaError::Unsupported(MediaKind::Video)));
    }
}
