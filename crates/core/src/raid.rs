//! Raid state machine data model (spec §3, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveType {
    Like,
    Repost,
    Reply,
    Quote,
    Follow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidStatus {
    Pending,
    Active,
    Completed,
    Aborted,
    TimedOut,
}

impl RaidStatus {
    /// Terminal states are absorbing (spec §4.6).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RaidStatus::Pending | RaidStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub r#type: ObjectiveType,
    pub target: String,
    pub required_count: u32,
    pub points_per_action: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: String,
    pub platform_id: String,
    pub display_name: String,
    pub secondary_id: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub actions_completed: u32,
    pub points_earned: u64,
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: Uuid,
    pub participant_id: String,
    pub objective_type: ObjectiveType,
    pub target: String,
    pub submitted_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified: bool,
    /// `true` once the verification adapter has permanently rejected this
    /// action (spec §6 "`Rejected` is terminal for that action") — distinct
    /// from `verified`, which only tracks the positive outcome, so a
    /// rejected action doesn't keep getting re-submitted for verification.
    pub rejected: bool,
    pub points: u64,
    pub proof: Option<Vec<u8>>,
}

impl Action {
    /// Still awaiting a terminal verification outcome.
    pub fn is_pending(&self) -> bool {
        !self.verified && !self.rejected
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaidState {
    pub raid_id: String,
    pub target_ref: String,
    pub objectives: Vec<Objective>,
    pub status: RaidStatus,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub max_participants: u32,
    pub participants: BTreeMap<String, Participant>,
    pub action_log: Vec<Action>,
    pub totals: BTreeMap<ObjectiveType, u64>,
}

impl RaidState {
    /// Every objective type's running total equals the sum of verified
    /// action points for that type (spec §3 invariant, §8 "totals
    /// conservation").
    pub fn recompute_totals(&mut self) {
        let mut totals: BTreeMap<ObjectiveType, u64> = BTreeMap::new();
        for action in &self.action_log {
            if action.verified {
                *totals.entry(action.objective_type).or_insert(0) += action.points;
            }
        }
        self.totals = totals;
    }

    pub fn totals_are_consistent(&self) -> bool {
        let mut expected: BTreeMap<ObjectiveType, u64> = BTreeMap::new();
        for action in &self.action_log {
            if action.verified {
                *expected.entry(action.objective_type).or_insert(0) += action.points;
            }
        }
        expected == self.totals
    }

    /// `true` once every objective's running total has met its required
    /// count's worth of points (spec §4.6 "active → completed").
    pub fn objectives_satisfied(&self) -> bool {
        self.objectives.iter().all(|o| {
            let completed_actions = self
                .action_log
                .iter()
                .filter(|a| a.objective_type == o.r#type && a.verified)
                .count() as u32;
            completed_actions >= o.required_count
        })
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() as u32 >= self.max_participants
    }

    /// Ranking order from spec §3: higher points first, then earlier
    /// `joined_at`, then lexicographic `participant_id`.
    pub fn leaderboard(&self, limit: usize) -> Vec<Participant> {
        let mut ranked: Vec<&Participant> = self.participants.values().collect();
        ranked.sort_by(|a, b| {
            b.points_earned
                .cmp(&a.points_earned)
                .then(a.joined_at.cmp(&b.joined_at))
                .then(a.participant_id.cmp(&b.participant_id))
        });
        ranked.into_iter().take(limit).cloned().collect()
    }

    pub fn distinct_objective_types(&self) -> BTreeSet<ObjectiveType> {
        self.objectives.iter().map(|o| o.r#type).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objective() -> Objective {
        Objective {
            r#type: ObjectiveType::Like,
            target: "post-1".into(),
            required_count: 2,
            points_per_action: 10,
        }
    }

    fn participant(id: &str, points: u64, joined_at: DateTime<Utc>) -> Participant {
        Participant {
            participant_id: id.into(),
            platform_id: format!("platform-{id}"),
            display_name: id.into(),
            secondary_id: None,
            joined_at,
            actions_completed: 0,
            points_earned: points,
            verified: true,
        }
    }

    #[test]
    fn leaderboard_breaks_ties_by_join_time_then_id() {
        let now = Utc::now();
        let mut state = RaidState {
            raid_id: "raid-1".into(),
            target_ref: "https://example.test/post/1".into(),
            objectives: vec![objective()],
            status: RaidStatus::Active,
            started_at: now,
            ends_at: now + chrono::Duration::seconds(60),
            max_participants: 10,
            participants: BTreeMap::new(),
            action_log: vec![],
            totals: BTreeMap::new(),
        };
        state
            .participants
            .insert("b".into(), participant("b", 10, now));
        state
            .participants
            .insert("a".into(), participant("a", 10, now));
        state.participants.insert(
            "c".into(),
            participant("c", 20, now + chrono::Duration::seconds(5)),
        );

        let board = state.leaderboard(10);
        assert_eq!(board[0].participant_id, "c");
        assert_eq!(board[1].participant_id, "a");
        assert_eq!(board[2].participant_id, "b");
    }

    #[test]
    fn totals_conservation_ignores_unverified_actions() {
        let now = Utc::now();
        let mut state = RaidState {
            raid_id: "raid-1".into(),
            target_ref: "t".into(),
            objectives: vec![objective()],
            status: RaidStatus::Active,
            started_at: now,
            ends_at: now + chrono::Duration::seconds(60),
            max_participants: 10,
            participants: BTreeMap::new(),
            action_log: vec![
                Action {
                    action_id: Uuid::new_v4(),
                    participant_id: "a".into(),
                    objective_type: ObjectiveType::Like,
                    target: "post-1".into(),
                    submitted_at: now,
                    verified_at: Some(now),
                    verified: true,
                    rejected: false,
                    points: 10,
                    proof: None,
                },
                Action {
                    action_id: Uuid::new_v4(),
                    participant_id: "b".into(),
                    objective_type: ObjectiveType::Like,
                    target: "post-1".into(),
                    submitted_at: now,
                    verified_at: None,
                    verified: false,
                    rejected: false,
                    points: 10,
                    proof: None,
                },
            ],
            totals: BTreeMap::new(),
        };
        state.recompute_totals();
        assert_eq!(state.totals.get(&ObjectiveType::Like), Some(&10));
        assert!(state.totals_are_consistent());
    }
}
