use std::env;

use tracing::debug;

pub const DEFAULT_LLM_MODEL: &str = "mixtral-8x7b-32768";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} not set. Export it or add it to a .env file")]
    Missing(&'static str),
}

/// Secret value whose `Debug` output never shows the contents.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: ApiKey,
    pub model: String,
    pub base_url: String,
}

/// Service credentials resolved at process start.
///
/// - `SERPAPI_KEY`: search provider key (required)
/// - `GROQ_API_KEY` or `LLM_API_KEY`: completion provider key (required)
/// - `LLM_MODEL`: model identifier (default `mixtral-8x7b-32768`)
/// - `LLM_BASE_URL`: OpenAI-compatible base URL (default Groq)
#[derive(Debug, Clone)]
pub struct Config {
    pub serpapi_key: ApiKey,
    pub llm: LlmConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_ok() {
            debug!("loaded .env file");
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let serpapi_key = non_empty("SERPAPI_KEY").ok_or(ConfigError::Missing("SERPAPI_KEY"))?;
        let llm_key = non_empty("GROQ_API_KEY")
            .or_else(|| non_empty("LLM_API_KEY"))
            .ok_or(ConfigError::Missing("GROQ_API_KEY"))?;

        Ok(Self {
            serpapi_key: ApiKey::new(serpapi_key),
            llm: LlmConfig {
                api_key: ApiKey::new(llm_key),
                model: non_empty("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                base_url: non_empty("LLM_BASE_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            },
        })
    }
}
