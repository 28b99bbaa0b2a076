//! src/services/ai_gateway.rs
//!
//! Chat-completion gateway for the OpenAI-compatible providers the service
//! can talk to. Provider choice and credentials come from the environment;
//! upstream failures are classified into `GatewayError` variants the HTTP
//! layer maps to user-facing statuses.

use crate::models::conversation::ChatMessage;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::{env, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    Qwen,
    Zhipu,
    Moonshot,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "deepseek" => Some(Self::DeepSeek),
            "qwen" => Some(Self::Qwen),
            "zhipu" => Some(Self::Zhipu),
            "moonshot" => Some(Self::Moonshot),
            _ => None,
        }
    }

    /// Env prefix, default base URL and default model.
    fn defaults(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::OpenAi => ("OPENAI", "https://api.openai.com/v1", "gpt-4o-mini"),
            Self::DeepSeek => ("DEEPSEEK", "https://api.deepseek.com/v1", "deepseek-chat"),
            Self::Qwen => (
                "QWEN",
                "https://dashscope.aliyuncs.com/compatible-mode/v1",
                "qwen-turbo",
            ),
            Self::Zhipu => ("ZHIPU", "https://open.bigmodel.cn/api/paas/v4", "glm-4"),
            Self::Moonshot => ("MOONSHOT", "https://api.moonshot.cn/v1", "moonshot-v1-8k"),
        }
    }

    /// Secondary env var consulted when `<PREFIX>_API_KEY` is unset.
    fn fallback_key_var(self) -> Option<&'static str> {
        match self {
            Self::DeepSeek => Some("OPENAI_API_KEY"),
            Self::Qwen => Some("DASHSCOPE_API_KEY"),
            _ => None,
        }
    }
}

/// Resolved provider settings. Fields are `None` for unknown providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub provider: String,
    pub kind: Option<ProviderKind>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Build from an arbitrary variable lookup (`AI_PROVIDER`, `<PREFIX>_*`).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = lookup("AI_PROVIDER").unwrap_or_else(|| "deepseek".into());
        let Some(kind) = ProviderKind::parse(&provider) else {
            return Self {
                provider,
                ..Self::default()
            };
        };

        let (prefix, base_url, model) = kind.defaults();
        let api_key = lookup(&format!("{}_API_KEY", prefix))
            .or_else(|| kind.fallback_key_var().and_then(|var| lookup(var)));

        Self {
            provider,
            kind: Some(kind),
            base_url: Some(lookup(&format!("{}_BASE_URL", prefix)).unwrap_or_else(|| base_url.into())),
            api_key,
            model: Some(lookup(&format!("{}_MODEL", prefix)).unwrap_or_else(|| model.into())),
        }
    }

    /// First seven characters of the key followed by `...`, for display.
    pub fn api_key_prefix(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(|key| format!("{}...", key.chars().take(7).collect::<String>()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("AI provider `{0}` is not supported")]
    UnknownProvider(String),
    #[error("no API key configured for provider `{0}`")]
    MissingApiKey(String),
    #[error("insufficient account balance")]
    InsufficientBalance { provider: String, details: String },
    #[error("invalid API key")]
    InvalidApiKey { details: String },
    #[error("too many requests")]
    RateLimited { details: String },
    #[error("provider responded with HTTP {status}")]
    Upstream { status: u16, details: String },
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GatewayError {
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::InsufficientBalance { details, .. }
            | Self::InvalidApiKey { details }
            | Self::RateLimited { details }
            | Self::Upstream { details, .. } => Some(details),
            _ => None,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::InsufficientBalance { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

/// Map a non-2xx upstream response to a typed failure.
pub fn classify_failure(provider: &str, status: u16, body: String) -> GatewayError {
    match status {
        402 => GatewayError::InsufficientBalance {
            provider: provider.to_string(),
            details: format!("the {} account balance is exhausted: {}", provider, body),
        },
        _ if body.contains("Insufficient Balance") => GatewayError::InsufficientBalance {
            provider: provider.to_string(),
            details: format!("the {} account balance is exhausted: {}", provider, body),
        },
        401 => GatewayError::InvalidApiKey { details: body },
        429 => GatewayError::RateLimited { details: body },
        status => GatewayError::Upstream {
            status,
            details: body,
        },
    }
}

/// Pull the generated text out of a chat-completion response.
///
/// Accepts `choices[0].message.content` or the legacy `choices[0].text`;
/// anything else yields an empty string.
pub fn extract_content(data: &Value) -> String {
    let choice = &data["choices"][0];
    choice["message"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .or_else(|| choice["text"].as_str())
        .unwrap_or_default()
        .to_string()
}

/// Anything that can turn a message list into generated text.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    fn config(&self) -> &ProviderConfig;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String, GatewayError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

/// Gateway speaking the OpenAI `/chat/completions` protocol.
#[derive(Debug, Clone)]
pub struct OpenAiCompatGateway {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OpenAiCompatGateway {
    pub fn new(config: ProviderConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatGateway for OpenAiCompatGateway {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String, GatewayError> {
        let cfg = &self.config;
        let (Some(base_url), Some(model)) = (cfg.base_url.as_deref(), cfg.model.as_deref()) else {
            return Err(GatewayError::UnknownProvider(cfg.provider.clone()));
        };
        let api_key = cfg
            .api_key
            .as_deref()
            .ok_or_else(|| GatewayError::MissingApiKey(cfg.provider.clone()))?;

        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        debug!(
            "calling {} ({} messages, model {})",
            cfg.provider,
            messages.len(),
            model
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&CompletionRequest {
                model,
                messages,
                temperature: options.temperature,
                max_tokens: options.max_tokens,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} returned HTTP {}", cfg.provider, status);
            return Err(classify_failure(&cfg.provider, status.as_u16(), body));
        }

        let data: Value = response.json().await?;
        Ok(extract_content(&data))
    }
}
