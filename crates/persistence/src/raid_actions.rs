//! Append-only raid action log (spec §3 `action_log`, §4.6), backed by the
//! `raid_actions` table. `RaidState.action_log` is the materialized view
//! the Raid Coordinator keeps in memory and persists as part of the owning
//! session's `raid_json`; this table gives an audit trail that doesn't
//! require rewriting that whole blob on every action.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use raidcore_core::{Action, ObjectiveType};
use scylla::frame::value::CqlTimestamp;
use scylla::IntoTypedRows;
use uuid::Uuid;

use crate::error::{PersistenceError, Result};
use crate::router::Router;

pub struct RaidActionLog {
    router: Arc<Router>,
    keyspace: String,
}

fn objective_str(t: ObjectiveType) -> &'static str {
    match t {
        ObjectiveType::Like => "like",
        ObjectiveType::Repost => "repost",
        ObjectiveType::Reply => "reply",
        ObjectiveType::Quote => "quote",
        ObjectiveType::Follow => "follow",
    }
}

fn objective_from_str(s: &str) -> ObjectiveType {
    match s {
        "repost" => ObjectiveType::Repost,
        "reply" => ObjectiveType::Reply,
        "quote" => ObjectiveType::Quote,
        "follow" => ObjectiveType::Follow,
        _ => ObjectiveType::Like,
    }
}

fn to_cql_ts(dt: DateTime<Utc>) -> CqlTimestamp {
    CqlTimestamp(dt.timestamp_millis())
}

fn from_cql_ts(ts: CqlTimestamp) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.0).unwrap_or_else(Utc::now)
}

impl RaidActionLog {
    pub fn new(router: Arc<Router>) -> Self {
        let keyspace = router.client().keyspace().to_string();
        Self { router, keyspace }
    }

    pub async fn append(&self, raid_id: &str, action: &Action) -> Result<()> {
        let query = format!(
            "INSERT INTO {}.raid_actions (raid_id, action_id, participant_id, objective_type, target, \
             submitted_at, verified_at, verified, rejected, points, proof) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.router
            .run_simple(
                &query,
                (
                    raid_id,
                    action.action_id,
                    &action.participant_id,
                    objective_str(action.objective_type),
                    &action.target,
                    to_cql_ts(action.submitted_at),
                    action.verified_at.map(to_cql_ts),
                    action.verified,
                    action.rejected,
                    action.points as i64,
                    action.proof.as_deref(),
                ),
            )
            .await?;
        Ok(())
    }

    /// Marks `action_id` verified in place. Scylla has no partial-row
    /// UPDATE restriction here since the clustering key (submitted_at,
    /// action_id) is unchanged — the fields outside the key can be
    /// overwritten directly.
    pub async fn mark_verified(&self, raid_id: &str, submitted_at: DateTime<Utc>, action_id: Uuid, points: u64) -> Result<()> {
        let query = format!(
            "UPDATE {}.raid_actions SET verified = true, verified_at = ?, points = ? \
             WHERE raid_id = ? AND submitted_at = ? AND action_id = ?",
            self.keyspace
        );
        self.router
            .run_simple(&query, (to_cql_ts(Utc::now()), points as i64, raid_id, to_cql_ts(submitted_at), action_id))
            .await?;
        Ok(())
    }

    /// Marks `action_id` permanently rejected (spec §6 "`Rejected` is
    /// terminal for that action") so it is never retried.
    pub async fn mark_rejected(&self, raid_id: &str, submitted_at: DateTime<Utc>, action_id: Uuid) -> Result<()> {
        let query = format!(
            "UPDATE {}.raid_actions SET rejected = true, verified_at = ? \
             WHERE raid_id = ? AND submitted_at = ? AND action_id = ?",
            self.keyspace
        );
        self.router.run_simple(&query, (to_cql_ts(Utc::now()), raid_id, to_cql_ts(submitted_at), action_id)).await?;
        Ok(())
    }

    /// Reads the full action log for a raid, backing leaderboard and totals
    /// aggregation — a whole-partition scan rather than a point lookup, so
    /// it runs on the session pool like other heavier reads.
    pub async fn list_for_raid(&self, raid_id: &str) -> Result<Vec<Action>> {
        let query = format!(
            "SELECT action_id, participant_id, objective_type, target, submitted_at, verified_at, \
             verified, rejected, points, proof FROM {}.raid_actions WHERE raid_id = ?",
            self.keyspace
        );
        let result = self.router.run_complex(&query, (raid_id,)).await?;
        let Some(rows) = result.rows else { return Ok(vec![]) };

        let mut actions = Vec::new();
        #[allow(clippy::type_complexity)]
        for row in
            rows.into_typed::<(Uuid, String, String, String, CqlTimestamp, Option<CqlTimestamp>, bool, bool, i64, Option<Vec<u8>>)>()
        {
            let (action_id, participant_id, objective_type, target, submitted_at, verified_at, verified, rejected, points, proof) =
                row.map_err(|e| PersistenceError::Decode(e.to_string()))?;
            actions.push(Action {
                action_id,
                participant_id,
                objective_type: objective_from_str(&objective_type),
                target,
                submitted_at: from_cql_ts(submitted_at),
                verified_at: verified_at.map(from_cql_ts),
                verified,
                rejected,
                points: points as u64,
                proof,
            });
        }
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objective_type_roundtrips() {
        for t in [ObjectiveType::Like, ObjectiveType::Repost, ObjectiveType::Reply, ObjectiveType::Quote, ObjectiveType::Follow] {
            assert_eq!(objective_from_str(objective_str(t)), t);
        }
    }
}
