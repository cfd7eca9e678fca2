//! Session aggregate (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::raid::RaidState;

/// What a session is for. `Raid` carries a [`RaidState`] payload; the others
/// never do. This is a tagged union by discriminant, not an inheritance
/// hierarchy (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Conversation,
    Community,
    Raid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Active,
    Expired,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RenewalPolicy {
    None,
    #[default]
    OnActivity,
    Explicit,
}

/// Opaque key-value metadata bag. Raid-kind sessions serialize their
/// [`RaidState`] into this bag under the `"raid"` key when persisted
/// (spec §6 persisted state layout).
pub type Metadata = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub agent_id: String,
    pub user_id: Option<String>,
    pub room_id: String,
    pub kind: SessionKind,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub timeout_ms: i64,
    pub renewal_policy: RenewalPolicy,
    pub message_count: u64,
    pub metadata: Metadata,
    /// Present only when `kind == SessionKind::Raid`; immutable once the
    /// raid leaves `active` (spec §3 invariant).
    pub raid: Option<RaidState>,
}

/// Parameters accepted by `Session Manager::create` (spec §4.5).
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub agent_id: String,
    pub user_id: Option<String>,
    pub room_id: String,
    pub kind: SessionKind,
    pub timeout_ms: i64,
    pub renewal_policy: RenewalPolicy,
    pub metadata: Metadata,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Whether `now` falls past `expires_at`, irrespective of the stored
    /// `state` (used by the cleanup sweep, spec §4.5).
    pub fn has_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> Session {
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
            expires_at: now + Duration::milliseconds(1000),
            timeout_ms: 1000,
            renewal_policy: RenewalPolicy::OnActivity,
            message_count: 0,
            metadata: Metadata::new(),
            raid: None,
        }
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let s = sample();
        assert!(!s.has_expired_at(s.expires_at - Duration::milliseconds(1)));
        assert!(s.has_expired_at(s.expires_at));
    }
}
