use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{NarrativeConfig, RequestConfig};
use crate::error::{NarrativeError, NarrativeResult};
use crate::prompts::NARRATIVE_SYSTEM_PROMPT;

use super::context::NarrativeContext;

/// Chat message role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Message in a chat-completions conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Request body for the chat-completions endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

/// Response format directive (JSON object mode)
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Response body from the chat-completions endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

/// One completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChoiceMessage,
}

/// Completion message content
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub content: String,
}

/// Client for the narrative collaborator (an OpenAI-style
/// chat-completions API).
#[derive(Clone)]
pub struct NarrativeClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f64,
    request_config: RequestConfig,
}

impl NarrativeClient {
    /// Create a new narrative client
    pub fn new(config: &NarrativeConfig, request_config: RequestConfig) -> NarrativeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(NarrativeError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            request_config,
        })
    }

    /// Whether an API key is configured. Without one the pipeline never
    /// calls the collaborator and degrades to the fallback narrative.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a narrative completion for the given context. Returns the
    /// raw completion text; parsing and validation happen in the caller.
    pub async fn request_narrative(&self, context: &NarrativeContext) -> NarrativeResult<String> {
        let Some(api_key) = self.api_key.clone() else {
            return Err(NarrativeError::Unavailable {
                message: "no API key configured".to_string(),
                retries: 0,
            });
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(NARRATIVE_SYSTEM_PROMPT),
                Message::user(context.to_json()),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        };

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying narrative request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &api_key, &request).await {
                Ok(completion) => {
                    let latency = start.elapsed();
                    info!(
                        model = %self.model,
                        latency_ms = latency.as_millis(),
                        "Narrative request succeeded"
                    );
                    return Ok(completion);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        model = %self.model,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "Narrative request failed"
                    );
                    // Timeouts are surfaced immediately so the pipeline can
                    // degrade instead of compounding the wait
                    if matches!(e, NarrativeError::Timeout { .. }) {
                        return Err(e);
                    }
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(NarrativeError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        api_key: &str,
        request: &ChatRequest,
    ) -> NarrativeResult<String> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling narrative collaborator"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NarrativeError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    NarrativeError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(NarrativeError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| NarrativeError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| NarrativeError::InvalidResponse {
                message: "response contained no choices".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrative_config(api_key: Option<&str>) -> NarrativeConfig {
        NarrativeConfig {
            api_key: api_key.map(String::from),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 1500,
            temperature: 0.7,
        }
    }

    #[test]
    fn test_client_creation() {
        let client = NarrativeClient::new(&narrative_config(Some("key")), RequestConfig::default());
        assert!(client.is_ok());
        assert!(client.unwrap().has_credentials());
    }

    #[test]
    fn test_client_without_credentials() {
        let client =
            NarrativeClient::new(&narrative_config(None), RequestConfig::default()).unwrap();
        assert!(!client.has_credentials());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = NarrativeConfig {
            base_url: "https://api.openai.com/".to_string(),
            ..narrative_config(Some("key"))
        };
        let client = NarrativeClient::new(&config, RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://api.openai.com");
    }
}
