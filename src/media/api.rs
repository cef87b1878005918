//! `ApiMediaBackend` — OpenAI-compatible image and video generation.
//!
//! Images are a single `POST /v1/images/generations`. Videos are a job:
//! `POST /v1/videos` returns an id which is polled at
//! `GET /v1/videos/{id}` until it reports `completed` or `failed`, bounded
//! by `timeout_secs`. All connection details come from [`MediaConfig`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{AspectRatio, MediaBackend, MediaError};
use crate::config::MediaConfig;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Longest provider error body quoted in a [`MediaError::Status`].
const MAX_ERROR_CHARS: usize = 200;

pub struct ApiMediaBackend {
    client: reqwest::Client,
    config: MediaConfig,
    poll_interval: Duration,
}

impl ApiMediaBackend {
    /// Build a backend from application config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`; a default client is used if the builder fails.
    pub fn from_config(config: &MediaConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override how often a video job is polled.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Attach auth, send, and decode a JSON body from a 2xx response.
    ///
    /// The `Authorization: Bearer …` header is attached only when
    /// `config.api_key` is non-empty.
    async fn send_json(&self, req: reqwest::RequestBuilder) -> Result<Value, MediaError> {
        let key = self.config.api_key.as_deref().unwrap_or("");
        let req = if key.is_empty() { req } else { req.bearer_auth(key) };

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Status {
                code: status.as_u16(),
                message: error_message(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| MediaError::Parse(e.to_string()))
    }
}

/// Pull `error.message` out of a JSON error body, or quote the raw body.
fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = json["error"]["message"].as_str() {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_ERROR_CHARS {
        let cut: String = trimmed.chars().take(MAX_ERROR_CHARS).collect();
        format!("{cut}…")
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl MediaBackend for ApiMediaBackend {
    async fn image(&self, prompt: &str, aspect: AspectRatio) -> Result<String, MediaError> {
        let body = serde_json::json!({
            "model":  self.config.image_model,
            "prompt": prompt,
            "size":   aspect.size(),
            "n":      1
        });

        let json = self
            .send_json(self.client.post(self.url("/v1/images/generations")).json(&body))
            .await?;

        let first = &json["data"][0];
        if let Some(url) = first["url"].as_str().filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }
        if let Some(b64) = first["b64_json"].as_str().filter(|b| !b.is_empty()) {
            return Ok(format!("data:image/png;base64,{b64}"));
        }
        Err(MediaError::EmptyResponse)
    }

    async fn video(&self, prompt: &str, aspect: AspectRatio) -> Result<String, MediaError> {
        let body = serde_json::json!({
            "model":  self.config.video_model,
            "prompt": prompt,
            "size":   aspect.size()
        });

        let job = self
            .send_json(self.client.post(self.url("/v1/videos")).json(&body))
            .await?;
        let id = job["id"]
            .as_str()
            .filter(|id| !id.is_empty())
            .ok_or(MediaError::EmptyResponse)?
            .to_string();
        log::debug!("media: video job {id} accepted");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.config.timeout_secs);
        loop {
            let status = self
                .send_json(self.client.get(self.url(&format!("/v1/videos/{id}"))))
                .await?;

            match status["status"].as_str() {
                Some("completed") => {
                    let url = status["url"]
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| self.url(&format!("/v1/videos/{id}/content")));
                    return Ok(url);
                }
                Some("failed") => {
                    let reason = status["error"]["message"]
                        .as_str()
                        .unwrap_or("provider gave no reason");
                    return Err(MediaError::Failed(reason.to_string()));
                }
                _ => {}
            }

            if tokio::time::Instant::now() + self.poll_interval > deadline {
                return Err(MediaError::Timeout);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, api_key: Option<&str>) -> MediaConfig {
        MediaConfig {
            base_url: base_url.into(),
            api_key: api_key.map(str::to_string),
            timeout_secs: 5,
            ..MediaConfig::default()
        }
    }

    #[test]
    fn from_config_builds_without_panic() {
        let _ = ApiMediaBackend::from_config(&MediaConfig::default());
    }

    #[test]
    fn error_message_prefers_json_message() {
        let body = r#"{"error":{"message":"Quota exceeded","code":429}}"#;
        assert_eq!(error_message(body), "Quota exceeded");
        assert_eq!(error_message("  plain failure \n"), "plain failure");
        assert!(error_message(&"x".repeat(500)).ends_with('…'));
    }

    #[tokio::test]
    async fn image_returns_url_and_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": [ { "url": "https://cdn/img.png" } ] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = ApiMediaBackend::from_config(&config(&server.uri(), Some("sk-test")));
        let url = backend.image("a fox", AspectRatio::Landscape).await.unwrap();
        assert_eq!(url, "https://cdn/img.png");
    }

    #[tokio::test]
    async fn image_accepts_inline_base64() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": [ { "b64_json": "AAAA" } ] })),
            )
            .mount(&server)
            .await;

        let backend = ApiMediaBackend::from_config(&config(&server.uri(), None));
        let url = backend.image("a fox", AspectRatio::Square).await.unwrap();
        assert_eq!(url, "data:image/png;base64,AAAA");
    }

    #[tokio::test]
    async fn image_quota_error_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({ "error": { "message": "You exceeded your quota" } })),
            )
            .mount(&server)
            .await;

        let backend = ApiMediaBackend::from_config(&config(&server.uri(), None));
        match backend.image("a fox", AspectRatio::Square).await {
            Err(MediaError::Status { code, message }) => {
                assert_eq!(code, 429);
                assert_eq!(message, "You exceeded your quota");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn image_without_data_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let backend = ApiMediaBackend::from_config(&config(&server.uri(), None));
        let err = backend.image("a fox", AspectRatio::Square).await.unwrap_err();
        assert!(matches!(err, MediaError::EmptyResponse));
    }

    #[tokio::test]
    async fn video_polls_until_completed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/videos"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "vid_1", "status": "queued" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/videos/vid_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "vid_1",
                "status": "completed",
                "url": "https://cdn/vid.mp4"
            })))
            .mount(&server)
            .await;

        let backend = ApiMediaBackend::from_config(&config(&server.uri(), None))
            .with_poll_interval(Duration::from_millis(10));
        let url = backend.video("waves", AspectRatio::Portrait).await.unwrap();
        assert_eq!(url, "https://cdn/vid.mp4");
    }

    #[tokio::test]
    async fn video_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "vid_2" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/videos/vid_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failed",
                "error": { "message": "content policy" }
            })))
            .mount(&server)
            .await;

        let backend = ApiMediaBackend::from_config(&config(&server.uri(), None))
            .with_poll_interval(Duration::from_millis(10));
        let err = backend.video("waves", AspectRatio::Square).await.unwrap_err();
        assert!(matches!(err, MediaError::Failed(ref m) if m == "content policy"));
    }
}
