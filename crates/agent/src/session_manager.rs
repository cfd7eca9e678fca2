//! Session Manager (spec §4.5): session CRUD, timeout/renewal, activity
//! tracking, and the cleanup sweep.
//!
//! Every mutation is serialized per-session via a lock held for the
//! duration of the critical section; cross-session reads (`find_or_create`'s
//! room lookup, the cleanup sweep) take snapshot reads through the
//! persistence layer instead of locking every session in play.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use raidcore_core::{
    BusEvent, CoreError, CreateSessionParams, RenewalPolicy, Result, Session, SessionState, Topic,
};
use raidcore_persistence::SessionStore;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::EventBus;

pub struct SessionManagerConfig {
    pub sweep_interval_ms: u64,
    pub retention_ms: u64,
}

/// Per-session critical-section locks, keyed by session id. Entries are
/// reaped lazily from `locks` whenever a lookup finds no other holder
/// (Arc strong count of 1 means no in-flight critical section).
pub struct SessionManager {
    table: Arc<dyn SessionStore>,
    bus: Arc<EventBus>,
    locks: DashMap<Uuid, Arc<AsyncMutex<()>>>,
    sweeping: AtomicBool,
    sweep_consecutive_failures: AtomicU32,
    config: SessionManagerConfig,
}

impl SessionManager {
    pub fn new(table: Arc<dyn SessionStore>, bus: Arc<EventBus>, config: SessionManagerConfig) -> Self {
        Self {
            table,
            bus,
            locks: DashMap::new(),
            sweeping: AtomicBool::new(false),
            sweep_consecutive_failures: AtomicU32::new(0),
            config,
        }
    }

    fn lock_for(&self, id: Uuid) -> Arc<AsyncMutex<()>> {
        self.locks.entry(id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    fn evict_lock_if_idle(&self, id: Uuid) {
        if let Some(entry) = self.locks.get(&id) {
            if Arc::strong_count(entry.value()) == 1 {
                drop(entry);
                self.locks.remove(&id);
            }
        }
    }

    pub async fn create(&self, params: CreateSessionParams) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            agent_id: params.agent_id,
            user_id: params.user_id,
            room_id: params.room_id,
            kind: params.kind,
            state: SessionState::Active,
            created_at: now,
            last_activity_at: now,
            expires_at: now + ChronoDuration::milliseconds(params.timeout_ms),
            timeout_ms: params.timeout_ms,
            renewal_policy: params.renewal_policy,
            message_count: 0,
            metadata: params.metadata,
            raid: None,
        };

        self.table.insert(&session).await.map_err(CoreError::from)?;
        self.emit("session.created", session.id, &session);
        Ok(session)
    }

    /// Reads and returns a snapshot; an expired session returns its
    /// terminal snapshot, not `None` (spec §4.5).
    pub async fn get(&self, id: Uuid) -> Result<Option<Session>> {
        let mut session = self.table.get(id).await.map_err(CoreError::from)?;
        if let Some(s) = session.as_mut() {
            if s.state == SessionState::Active && s.has_expired_at(Utc::now()) {
                s.state = SessionState::Expired;
            }
        }
        Ok(session)
    }

    /// Loads a session for a mutating call, applying the same lazy-expiry
    /// check as `get` and persisting the transition before the caller sees
    /// it — otherwise `update_activity`/`renew` could resurrect a session
    /// whose wall-clock deadline has already passed but whose stored state
    /// still reads `Active` (spec §8 lazy expiry).
    async fn load_live(&self, id: Uuid) -> Result<Session> {
        let mut session = self.table.get(id).await.map_err(CoreError::from)?.ok_or(CoreError::SessionNotFound)?;
        if session.state == SessionState::Active && session.has_expired_at(Utc::now()) {
            session.state = SessionState::Expired;
            self.table.update(&session).await.map_err(CoreError::from)?;
            self.emit("session.expired", session.id, &session);
        }
        if !session.is_active() {
            return Err(CoreError::SessionNotActive);
        }
        Ok(session)
    }

    /// Locates the active session for (agent, room), or creates one with
    /// `default_params` if none exists (spec §4.5 lifecycle).
    pub async fn find_or_create(&self, agent_id: &str, room_id: &str, default_params: impl FnOnce() -> CreateSessionParams) -> Result<Session> {
        let candidates = self.table.find_active_in_room(agent_id, room_id).await.map_err(CoreError::from)?;
        for id in candidates {
            if let Some(session) = self.get(id).await? {
                if session.is_active() {
                    return Ok(session);
                }
            }
        }
        self.create(default_params()).await
    }

    pub async fn update_activity(&self, id: Uuid, message_delta: u64) -> Result<()> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut session = self.load_live(id).await?;

        let now = Utc::now();
        session.last_activity_at = now;
        session.message_count += message_delta;
        if session.renewal_policy == RenewalPolicy::OnActivity {
            session.expires_at = now + ChronoDuration::milliseconds(session.timeout_ms);
        }

        self.table.update(&session).await.map_err(CoreError::from)?;
        drop(_guard);
        self.evict_lock_if_idle(id);
        Ok(())
    }

    /// Behaves as `update_activity(id, 0)` without incrementing counters.
    pub async fn heartbeat(&self, id: Uuid) -> Result<()> {
        self.update_activity(id, 0).await
    }

    pub async fn renew(&self, id: Uuid, extra_ms: Option<i64>) -> Result<chrono::DateTime<Utc>> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut session = self.load_live(id).await?;

        let extension = extra_ms.unwrap_or(session.timeout_ms);
        session.expires_at = Utc::now() + ChronoDuration::milliseconds(extension);
        self.table.update(&session).await.map_err(CoreError::from)?;
        let new_expires = session.expires_at;

        drop(_guard);
        self.evict_lock_if_idle(id);
        Ok(new_expires)
    }

    pub async fn end(&self, id: Uuid, reason: &str) -> Result<()> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut session = self.table.get(id).await.map_err(CoreError::from)?.ok_or(CoreError::SessionNotFound)?;
        session.state = SessionState::Completed;
        self.table.update(&session).await.map_err(CoreError::from)?;

        drop(_guard);
        self.evict_lock_if_idle(id);
        self.emit("session.ended", id, &serde_json::json!({ "session_id": id, "reason": reason }));
        Ok(())
    }

    fn emit(&self, event: &str, id: Uuid, payload: &impl serde::Serialize) {
        let payload = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        self.bus.publish(&Topic::session(id).to_string(), BusEvent::new(event, Topic::session(id), payload));
    }

    /// Spawns the background cleanup sweep (spec §4.5). Runs every
    /// `sweep_interval_ms`; stops when `cancel` fires.
    pub fn spawn_sweep(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let interval = std::time::Duration::from_millis(self.config.sweep_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("session cleanup sweep shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.run_sweep_once().await;
                    }
                }
            }
        })
    }

    /// Single-flight: a sweep already in progress causes this call to be a
    /// no-op (spec §4.5 "only one concurrent sweep per process").
    async fn run_sweep_once(&self) {
        if self.sweeping.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return;
        }

        let result = self.sweep_expired_and_stale().await;
        match result {
            Ok(()) => {
                self.sweep_consecutive_failures.store(0, Ordering::Relaxed);
                metrics::gauge!("raidcore_loop_degraded", "loop" => "session_sweep").set(0.0);
            }
            Err(e) => {
                tracing::warn!(error = %e, "session cleanup sweep failed");
                let failures = self.sweep_consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= 3 {
                    tracing::error!(failures, "session cleanup sweep degraded after consecutive failures");
                    metrics::gauge!("raidcore_loop_degraded", "loop" => "session_sweep").set(1.0);
                }
            }
        }

        self.sweeping.store(false, Ordering::Release);
    }

    async fn sweep_expired_and_stale(&self) -> Result<()> {
        let now = Utc::now();
        let retention = ChronoDuration::milliseconds(self.config.retention_ms as i64);
        let sessions = self.table.scan_all().await.map_err(CoreError::from)?;

        let mut expired_count = 0u64;
        let mut removed_count = 0u64;

        for mut session in sessions {
            if session.state == SessionState::Active && session.has_expired_at(now) {
                session.state = SessionState::Expired;
                self.table.update(&session).await.map_err(CoreError::from)?;
                self.emit("session.expired", session.id, &session);
                expired_count += 1;
                continue;
            }

            if session.state.is_terminal() && now - session.last_activity_at > retention {
                self.table.delete(session.id).await.map_err(CoreError::from)?;
                removed_count += 1;
            }
        }

        if expired_count > 0 || removed_count > 0 {
            tracing::info!(expired_count, removed_count, "session cleanup sweep completed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raidcore_core::{Metadata, SessionKind};
    use raidcore_persistence::fakes::InMemorySessionStore;

    fn test_manager() -> Arc<SessionManager> {
        let table: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let bus = Arc::new(EventBus::new());
        Arc::new(SessionManager::new(
            table,
            bus,
            SessionManagerConfig { sweep_interval_ms: 60_000, retention_ms: 86_400_000 },
        ))
    }

    fn params() -> CreateSessionParams {
        CreateSessionParams {
            agent_id: "agent-1".into(),
            user_id: None,
            room_id: "room-1".into(),
            kind: SessionKind::Conversation,
            timeout_ms: 3_600_000,
            renewal_policy: RenewalPolicy::OnActivity,
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn get_on_missing_session_returns_none() {
        let manager = test_manager();
        let missing = manager.get(Uuid::new_v4()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn create_then_update_activity_renews_expiry() {
        let manager = test_manager();
        let session = manager.create(params()).await.unwrap();
        let before = session.expires_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        manager.update_activity(session.id, 1).await.unwrap();

        let after = manager.get(session.id).await.unwrap().unwrap();
        assert!(after.expires_at >= before);
        assert_eq!(after.message_count, 1);
    }

    #[tokio::test]
    async fn update_activity_rejects_a_session_past_its_wall_clock_deadline() {
        let manager = test_manager();
        let mut create_params = params();
        create_params.timeout_ms = 1;
        let session = manager.create(create_params).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let err = manager.update_activity(session.id, 1).await.unwrap_err();
        assert!(matches!(err, CoreError::SessionNotActive));

        let after = manager.get(session.id).await.unwrap().unwrap();
        assert_eq!(after.state, SessionState::Expired);
    }

    #[tokio::test]
    async fn renew_rejects_a_session_past_its_wall_clock_deadline() {
        let manager = test_manager();
        let mut create_params = params();
        create_params.timeout_ms = 1;
        let session = manager.create(create_params).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let err = manager.renew(session.id, None).await.unwrap_err();
        assert!(matches!(err, CoreError::SessionNotActive));
    }
}
