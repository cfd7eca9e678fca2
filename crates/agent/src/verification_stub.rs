//! A concrete, worked-example [`VerificationAdapter`] (spec §6): simulates
//! the eventual-consistency shape a real platform check has (the action
//! needs a moment to become observable upstream) without calling out to
//! anything. Production verification adapters (checking a real platform's
//! API for the claimed like/repost/follow) are out of scope (spec §1).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use raidcore_core::{CoreError, ObjectiveType, VerificationAdapter, VerificationOutcome};

/// Becomes observable `settle_delay_ms` after submission; a target ending in
/// the reject marker is always terminal-rejected, everything else verifies.
pub struct PollingVerificationAdapter {
    settle_delay_ms: i64,
    reject_marker: String,
}

impl PollingVerificationAdapter {
    pub fn new(settle_delay_ms: i64) -> Self {
        Self {
            settle_delay_ms,
            reject_marker: "#invalid".to_string(),
        }
    }
}

impl Default for PollingVerificationAdapter {
    fn default() -> Self {
        Self::new(3_000)
    }
}

#[async_trait]
impl VerificationAdapter for PollingVerificationAdapter {
    async fn verify_action(
        &self,
        _objective_type: ObjectiveType,
        target: &str,
        _participant_ref: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<VerificationOutcome, CoreError> {
        if target.ends_with(&self.reject_marker) {
            return Ok(VerificationOutcome::Rejected);
        }

        let elapsed = Utc::now() - submitted_at;
        if elapsed.num_milliseconds() < self.settle_delay_ms {
            return Ok(VerificationOutcome::NotYet);
        }

        Ok(VerificationOutcome::Verified { points_override: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_yet_settled_is_retriable() {
        let adapter = PollingVerificationAdapter::new(60_000);
        let outcome = adapter
            .verify_action(ObjectiveType::Like, "post-1", "user-1", Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, VerificationOutcome::NotYet));
    }

    #[tokio::test]
    async fn settled_action_verifies() {
        let adapter = PollingVerificationAdapter::new(0);
        let outcome = adapter
            .verify_action(ObjectiveType::Like, "post-1", "user-1", Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert!(matches!(outcome, VerificationOutcome::Verified { .. }));
    }

    #[tokio::test]
    async fn reject_marker_is_terminal() {
        let adapter = PollingVerificationAdapter::new(0);
        let outcome = adapter
            .verify_action(ObjectiveType::Like, "post-1#invalid", "user-1", Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert!(matches!(outcome, VerificationOutcome::Rejected));
    }
}
