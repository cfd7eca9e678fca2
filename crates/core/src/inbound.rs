//! Canonical ingress and prompt-composition data model (spec §4.4, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output of Stage-1 normalization (spec §4.4 substep 7): a platform's raw
/// payload translated into a shape every downstream component understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub source_platform: String,
    pub source_user_key: String,
    pub room_key: String,
    pub text: Option<String>,
    pub attachments: Vec<String>,
    pub raw_ref: String,
    pub received_at: DateTime<Utc>,
    /// Adapter-assigned id used for Stage-1 dedup (spec §4.4 substep 4).
    pub platform_message_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    CommunityChat,
    RaidControl,
    CryptoQuery,
    Meme,
    Support,
    PersonalityTrigger,
    Emergency,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub confidence: f32,
    pub suspension_hints: Vec<String>,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            category: Category::Unknown,
            confidence: 0.0,
            suspension_hints: vec![],
        }
    }
}

/// Turn-pair stored and replayed as prompt history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

/// Sampling parameters handed to the model engine (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.95,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptHints {
    pub classification: Option<Category>,
    pub emotional_state: Option<String>,
}

/// The request object the Prompt Composer hands to the model engine
/// (spec §4.8) — the composer never calls the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub history: Vec<Turn>,
    pub user_input: String,
    pub capability_flags: Vec<String>,
    pub params: GenerationParams,
    pub hints: PromptHints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: String,
    pub tokens_used: u32,
    pub finish_reason: FinishReason,
}
