//! Model-engine contract implementation and response humanization.
//!
//! The [`raidcore_core::ModelEngine`] trait is the seam (spec §6); this
//! crate supplies [`HttpModelEngine`], a generic OpenAI-compatible chat
//! completion client, [`HttpEmbeddingClient`] for the embedding contract,
//! and [`humanize`] for post-processing.

pub mod backend;
pub mod embedding;
pub mod error;
pub mod humanize;

pub use backend::{turn, HttpModelEngine, HttpModelEngineConfig};
pub use embedding::{HttpEmbeddingClient, HttpEmbeddingClientConfig};
pub use error::ModelEngineError;
pub use humanize::{humanize, HumanizationConfig};
