//! External collaborator contracts (spec §6). Implementations live outside
//! this workspace's core concern (platform adapters, the model engine, the
//! embedding model) — these traits are the seam.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::inbound::{InboundMessage, ModelRequest, ModelResponse};
use crate::raid::ObjectiveType;

/// One ingress adapter per platform (spec §6).
#[async_trait]
pub trait IngressAdapter: Send + Sync {
    fn platform(&self) -> &str;

    /// Checks the adapter-specific signature scheme over the raw request.
    async fn verify(&self, raw_body: &[u8], headers: &[(String, String)]) -> Result<(), CoreError>;

    /// Produces the canonical [`InboundMessage`] form.
    fn parse(&self, raw_body: &[u8]) -> Result<InboundMessage, CoreError>;

    /// Delivers a response back to the source platform.
    async fn reply(&self, target: &str, text: &str, attachments: &[String]) -> Result<(), CoreError>;
}

/// Outcome of a verification-adapter call (spec §6).
#[derive(Debug, Clone)]
pub enum VerificationOutcome {
    Verified { points_override: Option<u64> },
    NotYet,
    Rejected,
}

/// One verification adapter per platform, confirming a claimed raid action
/// actually occurred externally (spec §6).
#[async_trait]
pub trait VerificationAdapter: Send + Sync {
    async fn verify_action(
        &self,
        objective_type: ObjectiveType,
        target: &str,
        participant_ref: &str,
        submitted_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<VerificationOutcome, CoreError>;
}

/// The model engine (spec §6, §4.8): consumes a composed prompt, returns a
/// response. How it generates is out of scope (spec §1).
#[async_trait]
pub trait ModelEngine: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, CoreError>;
}

/// The embedding model (spec §6): `embed(text) -> vector<f>`.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError>;
}
