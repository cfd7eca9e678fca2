//! Ambient request context: deadline + cancellation, threaded through every
//! internal call (spec §9 — "an explicit context value with deadline and
//! cancel channel through every internal call").

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Carries a deadline and a cancellation handle through a call chain.
///
/// Suspension points (database calls, embedding calls, verification-adapter
/// calls, model-engine calls, bus delivery, timers — spec §5) should race
/// against [`Context::cancelled`] and respect [`Context::deadline`].
#[derive(Clone, Debug)]
pub struct Context {
    deadline: Instant,
    cancel: CancellationToken,
}

impl Context {
    /// New root context with the given timeout budget.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Derive a child context that inherits cancellation from this one but
    /// may have a tighter deadline.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            deadline: candidate.min(self.deadline),
            cancel: self.cancel.child_token(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Await either cancellation or the deadline, whichever comes first.
    pub async fn cancelled_or_expired(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {},
            _ = tokio::time::sleep_until(self.deadline) => {},
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn child_deadline_never_exceeds_parent() {
        let parent = Context::with_timeout(Duration::from_millis(50));
        let child = parent.child_with_timeout(Duration::from_secs(10));
        assert!(child.deadline() <= parent.deadline());
    }

    #[tokio::test]
    async fn cancel_propagates_to_children() {
        let parent = Context::with_timeout(Duration::from_secs(10));
        let child = parent.child_with_timeout(Duration::from_secs(10));
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
