//! Prompt Composer (spec §4.8): assembles the model-engine request object.
//! Character/personality configuration is fed in as an opaque value here —
//! YAML loading and knowledge-base authoring are out of scope (spec §1).

use raidcore_core::{Category, Classification, GenerationParams, IdentityBinding, MemoryItem, ModelRequest, PromptHints, Session, Turn, TurnRole};

/// Minimal personality surface the composer reads from; everything else
/// about how a character is authored lives outside this workspace.
#[derive(Debug, Clone)]
pub struct PersonalityConfig {
    pub system_prompt: String,
    pub capability_flags: Vec<String>,
    pub params: GenerationParams,
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful community assistant.".to_string(),
            capability_flags: vec![],
            params: GenerationParams::default(),
        }
    }
}

/// Builds the [`ModelRequest`] the dispatcher will hand to the model
/// engine. Never calls the engine itself (spec §4.8).
#[allow(clippy::too_many_arguments)]
pub fn compose(
    _session: &Session,
    incoming_text: &str,
    classification: &Classification,
    recent_memory: &[MemoryItem],
    semantic_memory: &[(MemoryItem, f32)],
    identity: Option<&IdentityBinding>,
    personality: &PersonalityConfig,
) -> ModelRequest {
    let mut history: Vec<Turn> = recent_memory
        .iter()
        .rev()
        .filter_map(|item| {
            let role = match item.entity_id.as_str() {
                "assistant" => TurnRole::Assistant,
                _ => TurnRole::User,
            };
            if item.body.text.is_empty() {
                None
            } else {
                Some(Turn { role, text: item.body.text.clone(), at: item.created_at })
            }
        })
        .collect();

    let mut system_prompt = personality.system_prompt.clone();
    if let Some(binding) = identity {
        system_prompt.push_str(&format!("\nSpeaking with a verified member of {}.", binding.platform));
    }
    if !semantic_memory.is_empty() {
        system_prompt.push_str("\n\nRelevant context from memory:\n");
        for (item, score) in semantic_memory {
            system_prompt.push_str(&format!("- ({:.2}) {}\n", score, item.body.text));
        }
    }

    let emotional_state = match classification.category {
        Category::Emergency => Some("urgent".to_string()),
        Category::Support => Some("concerned".to_string()),
        Category::Meme => Some("playful".to_string()),
        _ => None,
    };

    history.sort_by_key(|t| t.at);

    ModelRequest {
        system_prompt,
        history,
        user_input: incoming_text.to_string(),
        capability_flags: personality.capability_flags.clone(),
        params: personality.params.clone(),
        hints: PromptHints {
            classification: Some(classification.category),
            emotional_state,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use raidcore_core::{CreateSessionParams, Metadata, RenewalPolicy, Session, SessionKind, SessionState};
    use uuid::Uuid;

    fn session() -> Session {
        let _ = CreateSessionParams {
            agent_id: "agent-1".into(),
            user_id: None,
            room_id: "room-1".into(),
            kind: SessionKind::Conversation,
            timeout_ms: 1000,
            renewal_policy: RenewalPolicy::OnActivity,
            metadata: Metadata::new(),
        };
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            agent_id: "agent-1".into(),
            user_id: None,
            room_id: "room-1".into(),
            kind: SessionKind::Conversation,
            state: SessionState::Active,
            created_at: now,
            last_activity_at: now,
            expires_at: now,
            timeout_ms: 1000,
            renewal_policy: RenewalPolicy::OnActivity,
            message_count: 0,
            metadata: Metadata::new(),
            raid: None,
        }
    }

    #[test]
    fn compose_sets_classification_hint() {
        let classification = Classification { category: Category::Meme, confidence: 0.8, suspension_hints: vec![] };
        let request = compose(&session(), "lol that's great", &classification, &[], &[], None, &PersonalityConfig::default());
        assert_eq!(request.hints.classification, Some(Category::Meme));
        assert_eq!(request.hints.emotional_state.as_deref(), Some("playful"));
        assert_eq!(request.user_input, "lol that's great");
    }

    #[test]
    fn semantic_memory_is_folded_into_system_prompt() {
        let classification = Classification::unknown();
        let item = MemoryItem {
            id: Uuid::new_v4(),
            agent_id: "agent-1".into(),
            room_id: "room-1".into(),
            entity_id: "user".into(),
            kind: "note".into(),
            body: raidcore_core::MemoryBody { text: "likes cats".into(), fields: Default::default() },
            embedding: None,
            created_at: Utc::now(),
        };
        let request = compose(&session(), "hi", &classification, &[], &[(item, 0.9)], None, &PersonalityConfig::default());
        assert!(request.system_prompt.contains("likes cats"));
    }
}
