use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ApiConfig, Config};

#[allow(dead_code)]
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

// Only `choices` is required; proxies in the wild often trim the rest.
#[allow(dead_code)]
#[derive(Debug, Deserialize, Clone)]
pub struct CompletionResponse {
    id: Option<String>,

    // "chat.completion"
    object: Option<String>,

    // Unix timestamp
    created: Option<u64>,

    model: Option<String>,

    usage: Option<Usage>,

    pub choices: Vec<Choice>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize, Clone)]
pub struct Choice {
    pub message: ReplyMessage,

    // Ex: 'stop' | 'length' | 'content_filter'
    finish_reason: Option<String>,

    #[serde(default)]
    index: u32,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize, Clone)]
pub struct ReplyMessage {
    #[serde(default)]
    pub role: String,

    // Can be null, e.g. when the content filter kicks in
    pub content: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize, Clone)]
pub struct Usage {
    // Some proxies only report part of the counters
    #[serde(default)]
    prompt_tokens: u64,

    #[serde(default)]
    completion_tokens: u64,

    #[serde(default)]
    total_tokens: u64,
}

/// Everything that can go wrong with a single completion request. None of these
/// are fatal; the `Display` text is what the user sees in place of a reply.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("failed to encode the request")]
    Encode(#[source] serde_json::Error),

    #[error("failed to send the request")]
    Transport(#[source] reqwest::Error),

    #[error("request failed with status {}", .0.as_u16())]
    HttpStatus(StatusCode),

    #[error("failed to parse the response")]
    Decode(#[source] serde_json::Error),

    #[error("the response contained no choices")]
    EmptyChoices,
}

/// `ApiClient` sends one-shot chat completion requests to an OpenAI compatible endpoint.
///
/// Every call carries exactly two messages, the system preamble and the user's
/// utterance, so nothing from earlier turns is remembered.
#[derive(Debug, Clone)]
pub struct ApiClient {
    api: ApiConfig,
    model_id: String,
    system_prompt: String,
    http: Client,
}

impl ApiClient {
    pub fn new(config: &Config, api: ApiConfig) -> reqwest::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(ApiClient {
            api,
            model_id: config.model_id.clone(),
            system_prompt: config.system_prompt.clone(),
            http: builder.build()?,
        })
    }

    /// Sends `utterance` to the configured endpoint and returns the text of the first choice.
    ///
    /// Only a `200 OK` counts as success. For any other status the body is
    /// dropped unread. Failures are logged with their cause before being returned.
    pub async fn complete(&self, utterance: &str) -> Result<String, CompletionError> {
        self.send_completion(utterance)
            .await
            .inspect_err(|e| match e {
                CompletionError::HttpStatus(status) => {
                    warn!(status = status.as_u16(), "completion request rejected")
                }
                other => warn!(error = ?other, "completion request failed"),
            })
    }

    async fn send_completion(&self, utterance: &str) -> Result<String, CompletionError> {
        let request = self.build_request(utterance);
        let payload = serde_json::to_vec(&request).map_err(CompletionError::Encode)?;
        debug!(bytes = payload.len(), url = %self.api.openai_proxy, "sending completion request");

        let response = self
            .http
            .post(&self.api.openai_proxy)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(&self.api.openai_api_key)
            .body(payload)
            .send()
            .await
            .map_err(CompletionError::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(CompletionError::HttpStatus(status));
        }

        let body = response.bytes().await.map_err(CompletionError::Transport)?;
        debug!(bytes = body.len(), "received completion response");

        let parsed: CompletionResponse =
            serde_json::from_slice(&body).map_err(CompletionError::Decode)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::EmptyChoices)?;

        Ok(choice.message.content.unwrap_or_default())
    }

    fn build_request(&self, utterance: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model_id.clone(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: self.system_prompt.clone(),
                },
                ChatMessage {
                    role: Role::User,
                    content: utterance.to_string(),
                },
            ],
        }
    }
}
