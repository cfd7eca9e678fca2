//! Memory Store data model (spec §3, §4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: Uuid,
    pub agent_id: String,
    pub room_id: String,
    pub entity_id: String,
    pub kind: String,
    pub body: MemoryBody,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryBody {
    pub text: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Configuration for whether a memory kind gets a synchronously-computed
/// embedding on write (spec §4.2 "embed-on-write allow-list").
#[derive(Debug, Clone, Default)]
pub struct EmbedOnWriteAllowList {
    kinds: std::collections::HashSet<String>,
}

impl EmbedOnWriteAllowList {
    pub fn new(kinds: impl IntoIterator<Item = String>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn allows(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }
}
