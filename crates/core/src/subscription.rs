//! Event bus subscription data model (spec §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bus topic: `session:<id>`, `raid:<id>`, or `agent:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(pub String);

impl Topic {
    pub fn session(id: impl std::fmt::Display) -> Self {
        Topic(format!("session:{id}"))
    }

    pub fn raid(raid_id: &str) -> Self {
        Topic(format!("raid:{raid_id}"))
    }

    pub fn agent(agent_id: &str) -> Self {
        Topic(format!("agent:{agent_id}"))
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub connection_id: Uuid,
    pub topic: Topic,
    pub filter: Option<String>,
    pub established_at: DateTime<Utc>,
}

/// An event published onto the bus. `payload` is already-serialized JSON so
/// the bus itself stays generic over producers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub event: String,
    pub topic: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

impl BusEvent {
    pub fn new(event: impl Into<String>, topic: impl std::fmt::Display, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            topic: topic.to_string(),
            payload,
            published_at: Utc::now(),
        }
    }
}
