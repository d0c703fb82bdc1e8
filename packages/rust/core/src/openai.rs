//! Language model over an OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use copyforge_shared::{
    CapabilityError, CopyforgeError, GenerationConfig, LanguageModel, Prompt, Result,
};

const USER_AGENT: &str = concat!("Copyforge/", env!("CARGO_PKG_VERSION"));

pub struct OpenAiCompatibleModel {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleModel {
    pub fn from_config(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            CopyforgeError::config(format!(
                "invalid generation endpoint '{}': {e}",
                config.endpoint
            ))
        })?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CopyforgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
            timeout,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, prompt: &Prompt) -> std::result::Result<String, CapabilityError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: prompt.temperature,
            max_tokens: prompt.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CapabilityError::Timeout {
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    CapabilityError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = format!("HTTP {status}: {}", text.chars().take(200).collect::<String>());
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    CapabilityError::Unavailable(format!("quota exhausted, {detail}"))
                }
                _ => CapabilityError::Unavailable(detail),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Malformed(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CapabilityError::Malformed("completion has no content".into()))?;

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
