use reqwest::Client;
use tracing::{debug, warn};

use super::types::{ApiError, ChatRequest, ChatResponse, Message, Sampling};
use crate::config::{ApiKey, LlmConfig};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Empty response: no completion choices returned")]
    EmptyResponse,

    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Chat-style completion endpoint.
/// Implemented by `ChatClient` for production; mock implementations used in tests.
pub trait CompletionClient {
    async fn complete(&self, messages: &[Message], sampling: Sampling) -> Result<String, LlmError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (Groq by default).
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
}

impl ChatClient {
    pub fn new(http: Client, config: &LlmConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: ApiKey::new("test-key"),
            model: crate::config::DEFAULT_LLM_MODEL.to_string(),
            base_url: base_url.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends a tiny completion to confirm the key and model are usable.
    pub async fn check(&self) -> Result<(), LlmError> {
        self.complete(&[Message::user("test")], Sampling::HEALTH_CHECK)
            .await
            .map(|_| ())
    }
}

impl CompletionClient for ChatClient {
    async fn complete(&self, messages: &[Message], sampling: Sampling) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
        };

        let start = std::time::Instant::now();
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .header("User-Agent", crate::USER_AGENT)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let api_error = serde_json::from_str::<ChatResponse>(&text)
                .ok()
                .and_then(|body| body.error);
            let classified = classify_api_error(status.as_u16(), api_error, &text);
            warn!(error = %classified, "completion API error");
            return Err(classified);
        }

        let text = response.text().await?;
        let body: ChatResponse = serde_json::from_str(&text)?;
        if let Some(err) = body.error {
            let classified = classify_api_error(status.as_u16(), Some(err), "");
            warn!(error = %classified, "completion API error in 200 response");
            return Err(classified);
        }

        let content = body
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or(LlmError::EmptyResponse)?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis(),
            "chat completion"
        );
        Ok(content)
    }
}

fn classify_api_error(status: u16, err: Option<ApiError>, raw_body: &str) -> LlmError {
    let message = err.and_then(|e| e.message).unwrap_or_else(|| {
        let end = raw_body.floor_char_boundary(200);
        format!("HTTP {status}: {}", &raw_body[..end])
    });

    match status {
        429 => LlmError::RateLimited(message),
        code => LlmError::Api { code, message },
    }
}
