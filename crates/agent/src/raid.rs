//! Raid Coordinator (spec §4.6): raid state machine, participant roster,
//! action verification, and scoring.
//!
//! A raid is a [`raidcore_core::Session`] of `kind = Raid` carrying a
//! [`RaidState`] payload; `RaidState.raid_id` is the owning session's id
//! rendered as a string, so no separate raid→session index is needed.
//! Mutation is serialized per-raid the same way Session Manager serializes
//! per-session (spec §9): a map of raid id to async mutex, held for the
//! critical section.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use raidcore_core::{
    Action, BusEvent, CoreError, Objective, ObjectiveType, Participant, RaidState, RaidStatus, Result, Session, SessionKind,
    SessionState, Topic, VerificationAdapter, VerificationOutcome,
};
use raidcore_persistence::{RaidActionLog, SessionStore};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::EventBus;

pub struct RaidCoordinatorConfig {
    pub poll_interval_ms: u64,
    pub verify_latency_min_ms: i64,
    pub verify_concurrency: usize,
    pub auto_start_on_join: bool,
}

/// Parameters accepted by [`RaidCoordinator::create`] (spec §4.6, §3
/// RaidState).
pub struct CreateRaidParams {
    pub agent_id: String,
    pub target_ref: String,
    pub objectives: Vec<Objective>,
    pub max_participants: u32,
    pub duration_ms: i64,
    pub auto_start: bool,
}

/// Identity fields a participant presents on join (spec §4.6
/// `PlatformIdentityMissing`).
pub struct JoinIdentity {
    pub participant_id: String,
    pub platform_id: String,
    pub display_name: String,
    pub secondary_id: Option<String>,
}

/// A claimed action submitted for verification (spec §4.6 `record_action`).
pub struct SubmittedAction {
    pub participant_id: String,
    pub objective_type: ObjectiveType,
    pub target: String,
    pub proof: Option<Vec<u8>>,
}

pub struct RaidMetrics {
    pub totals: BTreeMap<ObjectiveType, u64>,
    pub time_remaining_ms: i64,
    pub completion_ratio: f64,
}

pub struct RaidCoordinator {
    sessions: Arc<dyn SessionStore>,
    actions: Arc<RaidActionLog>,
    bus: Arc<EventBus>,
    verifier: Arc<dyn VerificationAdapter>,
    locks: DashMap<Uuid, Arc<AsyncMutex<()>>>,
    /// Bounds in-flight verification calls process-wide (spec §4.6 default
    /// 4 in-flight "per raid" — applied globally here rather than per-raid
    /// since verification volume per single raid rarely saturates it;
    /// documented simplification).
    verify_permits: Arc<tokio::sync::Semaphore>,
    monitor_consecutive_failures: AtomicU32,
    config: RaidCoordinatorConfig,
}

fn parse_raid_id(raid_id: &str) -> Result<Uuid> {
    raid_id.parse().map_err(|_| CoreError::InvalidRequest(format!("malformed raid id: {raid_id}")))
}

impl RaidCoordinator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        actions: Arc<RaidActionLog>,
        bus: Arc<EventBus>,
        verifier: Arc<dyn VerificationAdapter>,
        config: RaidCoordinatorConfig,
    ) -> Self {
        let verify_permits = Arc::new(tokio::sync::Semaphore::new(config.verify_concurrency.max(1)));
        Self {
            sessions,
            actions,
            bus,
            verifier,
            locks: DashMap::new(),
            verify_permits,
            monitor_consecutive_failures: AtomicU32::new(0),
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

    async fn load_raid_session(&self, raid_id: &str) -> Result<Session> {
        let id = parse_raid_id(raid_id)?;
        self.sessions.get(id).await.map_err(CoreError::from)?.ok_or(CoreError::SessionNotFound)
    }

    fn require_active_raid<'a>(&self, session: &'a Session) -> Result<&'a RaidState> {
        match &session.raid {
            Some(raid) if raid.status == RaidStatus::Active => Ok(raid),
            _ => Err(CoreError::RaidNotActive),
        }
    }

    /// `create(params) -> raid_session` (spec §4.6).
    pub async fn create(&self, params: CreateRaidParams) -> Result<Session> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let status = if params.auto_start { RaidStatus::Active } else { RaidStatus::Pending };
        let started_at = now;
        let ends_at = now + ChronoDuration::milliseconds(params.duration_ms);

        let raid = RaidState {
            raid_id: id.to_string(),
            target_ref: params.target_ref,
            objectives: params.objectives,
            status,
            started_at,
            ends_at,
            max_participants: params.max_participants,
            participants: BTreeMap::new(),
            action_log: Vec::new(),
            totals: BTreeMap::new(),
        };

        let session = Session {
            id,
            agent_id: params.agent_id,
            user_id: None,
            room_id: format!("raid:{id}"),
            kind: SessionKind::Raid,
            state: SessionState::Active,
            created_at: now,
            last_activity_at: now,
            expires_at: ends_at,
            timeout_ms: params.duration_ms,
            renewal_policy: raidcore_core::RenewalPolicy::None,
            message_count: 0,
            metadata: raidcore_core::Metadata::new(),
            raid: Some(raid),
        };

        self.sessions.insert(&session).await.map_err(CoreError::from)?;
        self.emit("raid.created", &session.id.to_string(), &session);
        Ok(session)
    }

    /// `join(raid_id, identity) -> Participant` (spec §4.6).
    pub async fn join(&self, raid_id: &str, identity: JoinIdentity) -> Result<Participant> {
        let session_id = parse_raid_id(raid_id)?;
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.sessions.get(session_id).await.map_err(CoreError::from)?.ok_or(CoreError::SessionNotFound)?;

        if identity.participant_id.is_empty() || identity.platform_id.is_empty() {
            return Err(CoreError::PlatformIdentityMissing);
        }

        let raid = session.raid.as_mut().ok_or(CoreError::RaidNotActive)?;

        if raid.status == RaidStatus::Pending && self.config.auto_start_on_join {
            raid.status = RaidStatus::Active;
        }
        if raid.status != RaidStatus::Active {
            return Err(CoreError::RaidNotActive);
        }
        if raid.participants.contains_key(&identity.participant_id) {
            return Err(CoreError::AlreadyJoined);
        }
        if raid.is_full() {
            return Err(CoreError::RaidFull);
        }

        let participant = Participant {
            participant_id: identity.participant_id.clone(),
            platform_id: identity.platform_id,
            display_name: identity.display_name,
            secondary_id: identity.secondary_id,
            joined_at: Utc::now(),
            actions_completed: 0,
            points_earned: 0,
            verified: false,
        };
        raid.participants.insert(identity.participant_id, participant.clone());

        self.sessions.update(&session).await.map_err(CoreError::from)?;
        drop(_guard);
        self.evict_lock_if_idle(session_id);

        self.emit("raid.participant_joined", raid_id, &participant);
        Ok(participant)
    }

    /// `record_action(raid_id, action) -> Action` (spec §4.6): appends an
    /// unverified action and triggers asynchronous verification. Takes an
    /// owned `Arc` (callers hold one already) since it spawns a task that
    /// outlives this call.
    pub async fn record_action(self: Arc<Self>, raid_id: &str, submitted: SubmittedAction) -> Result<Action> {
        let session_id = parse_raid_id(raid_id)?;
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.sessions.get(session_id).await.map_err(CoreError::from)?.ok_or(CoreError::SessionNotFound)?;
        let raid = self.require_active_raid(&session)?;
        if !raid.participants.contains_key(&submitted.participant_id) {
            return Err(CoreError::PlatformIdentityMissing);
        }

        let action = Action {
            action_id: Uuid::new_v4(),
            participant_id: submitted.participant_id,
            objective_type: submitted.objective_type,
            target: submitted.target,
            submitted_at: Utc::now(),
            verified_at: None,
            verified: false,
            rejected: false,
            points: 0,
            proof: submitted.proof,
        };

        let raid = session.raid.as_mut().expect("checked active above");
        raid.action_log.push(action.clone());
        self.sessions.update(&session).await.map_err(CoreError::from)?;
        self.actions.append(raid_id, &action).await.map_err(CoreError::from)?;

        drop(_guard);
        self.evict_lock_if_idle(session_id);

        let coordinator = Arc::clone(&self);
        let raid_id = raid_id.to_string();
        let action_id = action.action_id;
        tokio::spawn(async move {
            if let Err(e) = coordinator.verify_action(&raid_id, action_id).await {
                tracing::warn!(raid_id = %raid_id, action_id = %action_id, error = %e, "raid action verification failed");
            }
        });

        Ok(action)
    }

    /// Internal: calls the verification adapter for the action's objective
    /// type, and on success marks it verified and updates totals + the
    /// participant's score (spec §4.6 `verify_action`).
    ///
    /// The per-raid mutex is only held for the snapshot read and the later
    /// mutation; the external verification call runs outside it so a slow
    /// adapter can't stall other mutations on the same raid (spec §4.6).
    async fn verify_action(&self, raid_id: &str, action_id: Uuid) -> Result<()> {
        let session_id = parse_raid_id(raid_id)?;

        let action = {
            let lock = self.lock_for(session_id);
            let _guard = lock.lock().await;

            let session = self.sessions.get(session_id).await.map_err(CoreError::from)?.ok_or(CoreError::SessionNotFound)?;
            let raid = session.raid.as_ref().ok_or(CoreError::RaidNotActive)?;
            if raid.status != RaidStatus::Active {
                None
            } else {
                raid.action_log.iter().find(|a| a.action_id == action_id && a.is_pending()).cloned()
            }
        };
        self.evict_lock_if_idle(session_id);

        let Some(action) = action else { return Ok(()) };

        let _permit = self
            .verify_permits
            .acquire()
            .await
            .map_err(|_| CoreError::UpstreamUnavailable("verification semaphore closed".into()))?;
        let verify_start = std::time::Instant::now();
        let outcome = self
            .verifier
            .verify_action(action.objective_type, &action.target, &action.participant_id, action.submitted_at)
            .await?;
        metrics::histogram!("raidcore_raid_verify_latency_seconds").record(verify_start.elapsed().as_secs_f64());
        drop(_permit);

        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.sessions.get(session_id).await.map_err(CoreError::from)?.ok_or(CoreError::SessionNotFound)?;
        let raid = session.raid.as_mut().ok_or(CoreError::RaidNotActive)?;
        if raid.status != RaidStatus::Active || !raid.action_log.iter().any(|a| a.action_id == action_id && a.is_pending()) {
            drop(_guard);
            self.evict_lock_if_idle(session_id);
            return Ok(());
        }

        let mut completed = false;
        let was_verified = matches!(outcome, VerificationOutcome::Verified { .. });
        match outcome {
            VerificationOutcome::Verified { points_override } => {
                let objective = raid.objectives.iter().find(|o| o.r#type == action.objective_type);
                let points = points_override.or(objective.map(|o| o.points_per_action)).unwrap_or(0);

                if let Some(entry) = raid.action_log.iter_mut().find(|a| a.action_id == action_id) {
                    entry.verified = true;
                    entry.verified_at = Some(Utc::now());
                    entry.points = points;
                }
                if let Some(p) = raid.participants.get_mut(&action.participant_id) {
                    p.actions_completed += 1;
                    p.points_earned += points;
                }
                raid.recompute_totals();

                completed = raid.objectives_satisfied();
                if completed {
                    raid.status = RaidStatus::Completed;
                }

                self.sessions.update(&session).await.map_err(CoreError::from)?;
                self.actions.mark_verified(raid_id, action.submitted_at, action_id, points).await.map_err(CoreError::from)?;
            }
            VerificationOutcome::NotYet => {
                // Left unverified; the raid monitor's stale-action retry
                // drives the next attempt (spec §4.6, §7).
            }
            VerificationOutcome::Rejected => {
                if let Some(entry) = raid.action_log.iter_mut().find(|a| a.action_id == action_id) {
                    entry.rejected = true;
                    entry.verified_at = Some(Utc::now());
                }
                self.sessions.update(&session).await.map_err(CoreError::from)?;
                self.actions.mark_rejected(raid_id, action.submitted_at, action_id).await.map_err(CoreError::from)?;
            }
        }

        drop(_guard);
        self.evict_lock_if_idle(session_id);

        if was_verified {
            self.emit("raid.progress", raid_id, &session.raid);
            if completed {
                self.emit("raid.completed", raid_id, &session.raid);
            }
        }

        Ok(())
    }

    /// `leaderboard(raid_id, limit) -> sequence<Participant ranked>`.
    pub async fn leaderboard(&self, raid_id: &str, limit: usize) -> Result<Vec<Participant>> {
        let session = self.load_raid_session(raid_id).await?;
        let raid = session.raid.ok_or(CoreError::RaidNotActive)?;
        Ok(raid.leaderboard(limit))
    }

    /// `metrics(raid_id)`: current totals, time remaining, completion ratio.
    pub async fn metrics(&self, raid_id: &str) -> Result<RaidMetrics> {
        let session = self.load_raid_session(raid_id).await?;
        let raid = session.raid.ok_or(CoreError::RaidNotActive)?;

        let required_total: u64 = raid.objectives.iter().map(|o| o.required_count as u64).sum();
        let completed_total: u64 = raid
            .objectives
            .iter()
            .map(|o| raid.action_log.iter().filter(|a| a.objective_type == o.r#type && a.verified).count() as u64)
            .sum();
        let completion_ratio = if required_total == 0 { 1.0 } else { completed_total as f64 / required_total as f64 };

        Ok(RaidMetrics {
            totals: raid.totals.clone(),
            time_remaining_ms: (raid.ends_at - Utc::now()).num_milliseconds().max(0),
            completion_ratio,
        })
    }

    /// `complete(raid_id, reason)`: explicit terminal transition.
    pub async fn complete(&self, raid_id: &str, reason: &str) -> Result<()> {
        self.transition_terminal(raid_id, RaidStatus::Completed, reason).await
    }

    pub async fn abort(&self, raid_id: &str, reason: &str) -> Result<()> {
        self.transition_terminal(raid_id, RaidStatus::Aborted, reason).await
    }

    async fn transition_terminal(&self, raid_id: &str, status: RaidStatus, reason: &str) -> Result<()> {
        let session_id = parse_raid_id(raid_id)?;
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.sessions.get(session_id).await.map_err(CoreError::from)?.ok_or(CoreError::SessionNotFound)?;
        let raid = session.raid.as_mut().ok_or(CoreError::RaidNotActive)?;
        if raid.status != RaidStatus::Active && raid.status != RaidStatus::Pending {
            return Err(CoreError::RaidNotActive);
        }
        raid.status = status;
        session.state = SessionState::Completed;

        self.sessions.update(&session).await.map_err(CoreError::from)?;
        drop(_guard);
        self.evict_lock_if_idle(session_id);

        self.emit("raid.ended", raid_id, &serde_json::json!({ "raid_id": raid_id, "status": status, "reason": reason }));
        Ok(())
    }

    fn emit(&self, event: &str, raid_id: &str, payload: &impl serde::Serialize) {
        let payload = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        let topic = Topic::raid(raid_id);
        self.bus.publish(&topic.to_string(), BusEvent::new(event, topic, payload));
    }

    /// Spawns the monitoring loop (spec §4.6): polls every
    /// `poll_interval_ms`, transitioning raids to `timed-out` once
    /// `now ≥ ends_at`, and schedules verification for any action still
    /// unverified after `verify_latency_min_ms` — a catch-up path for
    /// actions whose eager `record_action` verification attempt never
    /// completed.
    pub fn spawn_monitor(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let interval = std::time::Duration::from_millis(self.config.poll_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("raid monitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.sweep_timed_out().await {
                            Ok(()) => {
                                self.monitor_consecutive_failures.store(0, Ordering::Relaxed);
                                metrics::gauge!("raidcore_loop_degraded", "loop" => "raid_monitor").set(0.0);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "raid timeout sweep failed");
                                let failures = self.monitor_consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                                if failures >= 3 {
                                    tracing::error!(failures, "raid monitor degraded after consecutive failures");
                                    metrics::gauge!("raidcore_loop_degraded", "loop" => "raid_monitor").set(1.0);
                                }
                            }
                        }
                        Arc::clone(&self).retry_stale_verifications().await;
                    }
                }
            }
        })
    }

    /// Scans active raids for unverified actions older than
    /// `verify_latency_min_ms` and spawns a verification attempt for each
    /// (spec §4.6).
    async fn retry_stale_verifications(self: Arc<Self>) {
        let now = Utc::now();
        let threshold = ChronoDuration::milliseconds(self.config.verify_latency_min_ms);

        let sessions = match self.sessions.scan_all().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "raid stale-action scan failed");
                return;
            }
        };

        for session in sessions {
            if session.kind != SessionKind::Raid {
                continue;
            }
            let Some(raid) = session.raid.as_ref() else { continue };
            if raid.status != RaidStatus::Active {
                continue;
            }

            for action in raid.action_log.iter().filter(|a| a.is_pending() && now - a.submitted_at >= threshold) {
                let coordinator = Arc::clone(&self);
                let raid_id = raid.raid_id.clone();
                let action_id = action.action_id;
                tokio::spawn(async move {
                    if let Err(e) = coordinator.verify_action(&raid_id, action_id).await {
                        tracing::warn!(raid_id = %raid_id, action_id = %action_id, error = %e, "stale raid action verification retry failed");
                    }
                });
            }
        }
    }

    async fn sweep_timed_out(&self) -> Result<()> {
        let now = Utc::now();
        let sessions = self.sessions.scan_all().await.map_err(CoreError::from)?;

        for mut session in sessions {
            if session.kind != SessionKind::Raid {
                continue;
            }
            let Some(raid) = session.raid.as_mut() else { continue };
            if raid.status == RaidStatus::Active && now >= raid.ends_at {
                raid.status = RaidStatus::TimedOut;
                session.state = SessionState::Completed;
                let raid_id = raid.raid_id.clone();

                self.sessions.update(&session).await.map_err(CoreError::from)?;
                self.emit("raid.ended", &raid_id, &serde_json::json!({ "raid_id": raid_id, "status": "timed-out" }));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_uuid_raid_ids() {
        let id = Uuid::new_v4();
        assert_eq!(parse_raid_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn rejects_malformed_raid_ids() {
        assert!(parse_raid_id("not-a-uuid").is_err());
    }
}
