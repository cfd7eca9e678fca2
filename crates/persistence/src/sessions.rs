//! Session and raid table CRUD (spec §3, §4.5, §4.6), layered on the
//! [`Router`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use raidcore_core::{RaidState, RenewalPolicy, Session, SessionKind, SessionState};
use scylla::frame::value::CqlTimestamp;
use scylla::IntoTypedRows;
use uuid::Uuid;

use crate::error::{PersistenceError, Result};
use crate::router::Router;

/// The seam the Session Manager depends on (spec §4.5), so unit tests can
/// exercise lock/expiry/eviction logic against an in-memory store instead of
/// a live Scylla instance.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Session>>;
    async fn update(&self, session: &Session) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    async fn scan_all(&self) -> Result<Vec<Session>>;
    async fn find_active_in_room(&self, agent_id: &str, room_id: &str) -> Result<Vec<Uuid>>;
}

pub struct SessionTable {
    router: Arc<Router>,
    keyspace: String,
}

fn to_cql_ts(dt: DateTime<Utc>) -> CqlTimestamp {
    CqlTimestamp(dt.timestamp_millis())
}

fn from_cql_ts(ts: CqlTimestamp) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.0).unwrap_or_else(Utc::now)
}

fn kind_str(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Conversation => "conversation",
        SessionKind::Community => "community",
        SessionKind::Raid => "raid",
    }
}

fn kind_from_str(s: &str) -> SessionKind {
    match s {
        "community" => SessionKind::Community,
        "raid" => SessionKind::Raid,
        _ => SessionKind::Conversation,
    }
}

fn state_str(state: SessionState) -> &'static str {
    match state {
        SessionState::Active => "active",
        SessionState::Expired => "expired",
        SessionState::Completed => "completed",
        SessionState::Failed => "failed",
    }
}

fn state_from_str(s: &str) -> SessionState {
    match s {
        "expired" => SessionState::Expired,
        "completed" => SessionState::Completed,
        "failed" => SessionState::Failed,
        _ => SessionState::Active,
    }
}

fn renewal_str(p: RenewalPolicy) -> &'static str {
    match p {
        RenewalPolicy::None => "none",
        RenewalPolicy::OnActivity => "on-activity",
        RenewalPolicy::Explicit => "explicit",
    }
}

fn renewal_from_str(s: &str) -> RenewalPolicy {
    match s {
        "none" => RenewalPolicy::None,
        "explicit" => RenewalPolicy::Explicit,
        _ => RenewalPolicy::OnActivity,
    }
}

impl SessionTable {
    pub fn new(router: Arc<Router>) -> Self {
        let keyspace = router.client().keyspace().to_string();
        Self { router, keyspace }
    }
}

#[async_trait]
impl SessionStore for SessionTable {
    async fn insert(&self, session: &Session) -> Result<()> {
        let metadata_json = serde_json::to_string(&session.metadata).map_err(|e| PersistenceError::Decode(e.to_string()))?;
        let raid_json = match &session.raid {
            Some(raid) => Some(serde_json::to_string(raid).map_err(|e| PersistenceError::Decode(e.to_string()))?),
            None => None,
        };

        let query = format!(
            "INSERT INTO {}.sessions (session_id, agent_id, user_id, room_id, kind, state, created_at, \
             last_activity_at, expires_at, timeout_ms, renewal_policy, message_count, metadata_json, raid_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.router
            .run_simple(
                &query,
                (
                    session.id,
                    &session.agent_id,
                    &session.user_id,
                    &session.room_id,
                    kind_str(session.kind),
                    state_str(session.state),
                    to_cql_ts(session.created_at),
                    to_cql_ts(session.last_activity_at),
                    to_cql_ts(session.expires_at),
                    session.timeout_ms,
                    renewal_str(session.renewal_policy),
                    session.message_count as i32,
                    metadata_json,
                    raid_json,
                ),
            )
            .await?;

        let by_room = format!(
            "INSERT INTO {}.sessions_by_room (agent_id, room_id, session_id, state) VALUES (?, ?, ?, ?)",
            self.keyspace
        );
        self.router
            .run_simple(&by_room, (&session.agent_id, &session.room_id, session.id, state_str(session.state)))
            .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>> {
        let query = format!(
            "SELECT session_id, agent_id, user_id, room_id, kind, state, created_at, last_activity_at, \
             expires_at, timeout_ms, renewal_policy, message_count, metadata_json, raid_json \
             FROM {}.sessions WHERE session_id = ?",
            self.keyspace
        );
        let result = self.router.run_simple(&query, (id,)).await?;
        let Some(rows) = result.rows else { return Ok(None) };

        #[allow(clippy::type_complexity)]
        let typed_rows = rows.into_typed::<(
            Uuid,
            String,
            Option<String>,
            String,
            String,
            String,
            CqlTimestamp,
            CqlTimestamp,
            CqlTimestamp,
            i64,
            String,
            i32,
            String,
            Option<String>,
        )>();

        for row in typed_rows {
            let (
                session_id,
                agent_id,
                user_id,
                room_id,
                kind,
                state,
                created_at,
                last_activity_at,
                expires_at,
                timeout_ms,
                renewal_policy,
                message_count,
                metadata_json,
                raid_json,
            ) = row.map_err(|e| PersistenceError::Decode(e.to_string()))?;

            let metadata = serde_json::from_str(&metadata_json).map_err(|e| PersistenceError::Decode(e.to_string()))?;
            let raid: Option<RaidState> = match raid_json {
                Some(s) => Some(serde_json::from_str(&s).map_err(|e| PersistenceError::Decode(e.to_string()))?),
                None => None,
            };

            return Ok(Some(Session {
                id: session_id,
                agent_id,
                user_id,
                room_id,
                kind: kind_from_str(&kind),
                state: state_from_str(&state),
                created_at: from_cql_ts(created_at),
                last_activity_at: from_cql_ts(last_activity_at),
                expires_at: from_cql_ts(expires_at),
                timeout_ms,
                renewal_policy: renewal_from_str(&renewal_policy),
                message_count: message_count as u64,
                metadata,
                raid,
            }));
        }

        Ok(None)
    }

    /// Replaces the full row. Session Manager is the only caller (spec §3
    /// ownership note); this table has no partial-update path.
    async fn update(&self, session: &Session) -> Result<()> {
        self.insert(session).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let query = format!("DELETE FROM {}.sessions WHERE session_id = ?", self.keyspace);
        self.router.run_simple(&query, (id,)).await?;
        Ok(())
    }

    /// Full-table scan used by the cleanup sweep (spec §4.5). `sessions` is
    /// partitioned by `session_id` alone, so this reads every partition
    /// rather than a single one; callers page through `run_rows_paged`
    /// rather than pulling an unbounded in-memory result set.
    async fn scan_all(&self) -> Result<Vec<Session>> {
        use futures::stream::StreamExt;

        let query = format!(
            "SELECT session_id, agent_id, user_id, room_id, kind, state, created_at, last_activity_at, \
             expires_at, timeout_ms, renewal_policy, message_count, metadata_json, raid_json FROM {}.sessions",
            self.keyspace
        );
        let rows = self.router.run_rows_paged(&query, &[]).await?;
        let mut sessions = Vec::new();

        #[allow(clippy::type_complexity)]
        let mut typed_rows = rows.into_typed::<(
            Uuid,
            String,
            Option<String>,
            String,
            String,
            String,
            CqlTimestamp,
            CqlTimestamp,
            CqlTimestamp,
            i64,
            String,
            i32,
            String,
            Option<String>,
        )>();

        while let Some(row) = typed_rows.next().await {
            let (
                session_id,
                agent_id,
                user_id,
                room_id,
                kind,
                state,
                created_at,
                last_activity_at,
                expires_at,
                timeout_ms,
                renewal_policy,
                message_count,
                metadata_json,
                raid_json,
            ) = row.map_err(|e| PersistenceError::Decode(e.to_string()))?;

            let metadata = serde_json::from_str(&metadata_json).map_err(|e| PersistenceError::Decode(e.to_string()))?;
            let raid: Option<RaidState> = match raid_json {
                Some(s) => Some(serde_json::from_str(&s).map_err(|e| PersistenceError::Decode(e.to_string()))?),
                None => None,
            };

            sessions.push(Session {
                id: session_id,
                agent_id,
                user_id,
                room_id,
                kind: kind_from_str(&kind),
                state: state_from_str(&state),
                created_at: from_cql_ts(created_at),
                last_activity_at: from_cql_ts(last_activity_at),
                expires_at: from_cql_ts(expires_at),
                timeout_ms,
                renewal_policy: renewal_from_str(&renewal_policy),
                message_count: message_count as u64,
                metadata,
                raid,
            });
        }

        Ok(sessions)
    }

    /// Finds the active session ids for an (agent, room) pair (spec §4.5:
    /// "creates on first ingress for a (agent, room) pair with no active
    /// session").
    async fn find_active_in_room(&self, agent_id: &str, room_id: &str) -> Result<Vec<Uuid>> {
        let query = format!(
            "SELECT session_id, state FROM {}.sessions_by_room WHERE agent_id = ? AND room_id = ?",
            self.keyspace
        );
        let result = self.router.run_simple(&query, (agent_id, room_id)).await?;
        let Some(rows) = result.rows else { return Ok(vec![]) };

        let mut ids = Vec::new();
        for row in rows.into_typed::<(Uuid, String)>() {
            let (id, state) = row.map_err(|e| PersistenceError::Decode(e.to_string()))?;
            if state == "active" {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrips() {
        for kind in [SessionKind::Conversation, SessionKind::Community, SessionKind::Raid] {
            assert_eq!(kind_from_str(kind_str(kind)), kind);
        }
    }

    #[test]
    fn state_roundtrips() {
        for state in [SessionState::Active, SessionState::Expired, SessionState::Completed, SessionState::Failed] {
            assert_eq!(state_from_str(state_str(state)), state);
        }
    }
}
