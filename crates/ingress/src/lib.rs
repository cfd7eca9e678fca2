//! Ingress Pipeline Stage 1 (spec §4.4): blocklist, adapter signature
//! verification, rate limiting, deduplication, schema validation, and spam
//! heuristics, run in order ahead of any downstream work.

pub mod blocklist;
pub mod dedup;
pub mod error;
pub mod pipeline;
pub mod rate_limit;
pub mod spam;
pub mod webhook_adapter;

pub use blocklist::Blocklist;
pub use dedup::DedupCache;
pub use error::IngressError;
pub use pipeline::{PipelineConfig, Stage1Outcome, Stage1Pipeline};
pub use rate_limit::RateLimiter;
pub use spam::SpamClassifier;
pub use webhook_adapter::{RequiredFields, WebhookAdapter};
