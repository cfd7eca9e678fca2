//! Thin dispatcher (spec §4.8): calls the model engine with a composed
//! request, humanizes the response, persists the turn pair, and publishes
//! `session.message` on the bus. The composer never touches the engine —
//! this is the only place that does.

use std::sync::Arc;

use raidcore_core::{BusEvent, CoreError, ModelEngine, ModelRequest, ModelResponse, Result, Topic, Turn, TurnRole};
use raidcore_memory::MemoryStore;
use raidcore_model_engine::{humanize, HumanizationConfig};
use uuid::Uuid;

use crate::bus::EventBus;

pub struct Dispatcher {
    engine: Arc<dyn ModelEngine>,
    memory: Arc<MemoryStore>,
    bus: Arc<EventBus>,
    humanization: HumanizationConfig,
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn ModelEngine>, memory: Arc<MemoryStore>, bus: Arc<EventBus>, humanization: HumanizationConfig) -> Self {
        Self { engine, memory, bus, humanization }
    }

    /// Runs one request/response exchange for `session_id`/`agent_id`/
    /// `room_id`, storing both turns and publishing the assistant's reply.
    pub async fn dispatch(&self, session_id: Uuid, agent_id: &str, room_id: &str, request: ModelRequest) -> Result<ModelResponse> {
        let user_text = request.user_input.clone();
        let mut response = self.engine.complete(request).await?;

        let mut rng = rand::thread_rng();
        response.text = humanize(&response.text, &self.humanization, &mut rng);

        self.store_turn(agent_id, room_id, TurnRole::User, &user_text).await?;
        self.store_turn(agent_id, room_id, TurnRole::Assistant, &response.text).await?;

        self.emit_message(session_id, &response.text);
        Ok(response)
    }

    async fn store_turn(&self, agent_id: &str, room_id: &str, role: TurnRole, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let turn = Turn { role, text: text.to_string(), at: chrono::Utc::now() };
        let entity_id = match role {
            TurnRole::Assistant => "assistant",
            TurnRole::User => "user",
            TurnRole::System => "system",
        };

        let item = raidcore_core::MemoryItem {
            id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            room_id: room_id.to_string(),
            entity_id: entity_id.to_string(),
            kind: "conversation_turn".to_string(),
            body: raidcore_core::MemoryBody {
                text: turn.text.clone(),
                fields: Default::default(),
            },
            embedding: None,
            created_at: turn.at,
        };

        self.memory.put(item).await.map_err(CoreError::from)?;
        Ok(())
    }

    fn emit_message(&self, session_id: Uuid, text: &str) {
        let topic = Topic::session(session_id);
        let payload = serde_json::json!({ "session_id": session_id, "text": text });
        self.bus.publish(&topic.to_string(), BusEvent::new("session.message", topic, payload));
    }
}
