//! Core types and traits for the session/raid coordination core.
//!
//! This crate provides foundational pieces shared across all other crates:
//! - The data model (session, raid, memory item, identity, subscription)
//! - External collaborator traits (ingress adapter, verification adapter,
//!   model engine, embedding client)
//! - The shared error taxonomy
//! - The ambient request context (deadline + cancellation)

pub mod context;
pub mod error;
pub mod identity;
pub mod inbound;
pub mod memory_item;
pub mod raid;
pub mod session;
pub mod subscription;
pub mod traits;

pub use context::Context;
pub use error::{CoreError, Result};
pub use identity::IdentityBinding;
pub use inbound::{
    Category, Classification, FinishReason, GenerationParams, InboundMessage, ModelRequest,
    ModelResponse, PromptHints, Turn, TurnRole,
};
pub use memory_item::{EmbedOnWriteAllowList, MemoryBody, MemoryItem};
pub use raid::{Action, Objective, ObjectiveType, Participant, RaidState, RaidStatus};
pub use session::{CreateSessionParams, Metadata, RenewalPolicy, Session, SessionKind, SessionState};
pub use subscription::{BusEvent, Subscription, Topic};
pub use traits::{EmbeddingClient, IngressAdapter, ModelEngine, VerificationAdapter, VerificationOutcome};
