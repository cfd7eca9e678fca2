//! Generic HTTP implementation of [`ModelEngine`] (spec §4.8, §6). How the
//! upstream actually generates is out of scope; this speaks an
//! OpenAI-compatible chat-completion wire shape, the common denominator
//! across self-hosted and vendor backends.

use async_trait::async_trait;
use raidcore_core::{CoreError, FinishReason, ModelEngine, ModelRequest, ModelResponse, Turn, TurnRole};
use serde::{Deserialize, Serialize};

use crate::error::ModelEngineError;

#[derive(Debug, Clone)]
pub struct HttpModelEngineConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout_ms: u64,
}

pub struct HttpModelEngine {
    client: reqwest::Client,
    config: HttpModelEngineConfig,
}

impl HttpModelEngine {
    pub fn new(config: HttpModelEngineConfig) -> Result<Self, ModelEngineError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ModelEngineError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

fn role_str(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Assistant => "assistant",
        TurnRole::System => "system",
    }
}

fn finish_reason_from(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn history_to_messages(request: &ModelRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(ChatMessage {
        role: "system",
        content: request.system_prompt.clone(),
    });
    for turn in &request.history {
        messages.push(ChatMessage {
            role: role_str(turn.role),
            content: turn.text.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: request.user_input.clone(),
    });
    messages
}

#[async_trait]
impl ModelEngine for HttpModelEngine {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, CoreError> {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: history_to_messages(&request),
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            frequency_penalty: request.params.frequency_penalty,
            presence_penalty: request.params.presence_penalty,
        };

        let mut req = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(ModelEngineError::from)?;
        if !response.status().is_success() {
            return Err(ModelEngineError::Status(response.status().as_u16()).into());
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelEngineError::Decode(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelEngineError::Decode("empty choices array".into()))?;

        Ok(ModelResponse {
            text: choice.message.content,
            tokens_used: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
            finish_reason: finish_reason_from(choice.finish_reason.as_deref()),
        })
    }
}

/// Helper used by the agent crate to build a [`Turn`] from a completed
/// exchange before writing it into prompt history.
pub fn turn(role: TurnRole, text: impl Into<String>) -> Turn {
    Turn {
        role,
        text: text.into(),
        at: chrono::Utc::now(),
    }
}
