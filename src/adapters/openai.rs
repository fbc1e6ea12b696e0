//! OpenAI-compatible adapter: Implementation of LanguageModel.
//!
//! Sends one user message per call to `{base_url}/chat/completions` and
//! returns `choices[0].message.content`. No conversation state is kept.

use std::time::Duration;

use serde_json::json;
use zeroize::Zeroizing;

use crate::ports::{LanguageModel, ModelError};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model name.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Connection settings for a chat-completions API.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub api_key: Zeroizing<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiModel {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiModel {
    /// Build a client.
    ///
    /// # Errors
    /// Returns `ModelError::Unavailable` if the HTTP client cannot be built.
    pub fn new(mut config: OpenAiConfig) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { client, config })
    }
}

impl LanguageModel for OpenAiModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let request_body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": self.config.temperature
        });

        tracing::debug!("Calling language model {}", self.config.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(self.config.api_key.as_str())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // The error body can echo the prompt; only the status is kept.
            return Err(ModelError::Rejected {
                status: status.as_u16(),
            });
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        response_json["choices"]
            .get(0)
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| ModelError::InvalidResponse("No content in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    async fn spawn_mock_api() -> String {
        async fn completions(
            headers: HeaderMap,
            Json(body): Json<serde_json::Value>,
        ) -> Result<Json<serde_json::Value>, StatusCode> {
            if headers.get("authorization").and_then(|v| v.to_str().ok())
                != Some("Bearer test-key")
            {
                return Err(StatusCode::UNAUTHORIZED);
            }
            let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
            if prompt == "empty" {
                return Ok(Json(serde_json::json!({ "choices": [] })));
            }
            Ok(Json(serde_json::json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": format!("model={} temp={} echo={prompt}", body["model"], body["temperature"])
                    }
                }]
            })))
        }

        let app = Router::new().route("/v1/chat/completions", post(completions));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Should bind");
        let addr = listener.local_addr().expect("Should have addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock api");
        });
        format!("http://{addr}/v1/")
    }

    fn config(base_url: String, key: &str) -> OpenAiConfig {
        OpenAiConfig {
            base_url,
            model: "test-model".to_string(),
            temperature: 0.5,
            api_key: Zeroizing::new(key.to_string()),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_completion_returns_content() {
        let url = spawn_mock_api().await;
        let model = OpenAiModel::new(config(url, "test-key")).expect("Should build");

        let answer = model.complete("hello").await.expect("Should complete");
        assert_eq!(answer, "model=\"test-model\" temp=0.5 echo=hello");
    }

    #[tokio::test]
    async fn test_rejected_status() {
        let url = spawn_mock_api().await;
        let model = OpenAiModel::new(config(url, "wrong")).expect("Should build");

        assert!(matches!(
            model.complete("hello").await,
            Err(ModelError::Rejected { status: 401 })
        ));
    }

    #[tokio::test]
    async fn test_missing_content_is_invalid() {
        let url = spawn_mock_api().await;
        let model = OpenAiModel::new(config(url, "test-key")).expect("Should build");

        assert!(matches!(
            model.complete("empty").await,
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_config_debug_hides_key() {
        let debug = format!("{:?}", config("http://x".to_string(), "sk-secret"));
        assert!(!debug.contains("sk-secret"));
    }
}
