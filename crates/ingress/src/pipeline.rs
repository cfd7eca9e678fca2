//! Stage 1 — Security & Normalization (spec §4.4). Runs the ordered
//! substeps, short-circuiting on the first that rejects, and emits an
//! observability event with `(trace_id, stage, outcome, checks_applied,
//! elapsed_ns)` for every substep.

use std::time::{Duration, Instant};

use raidcore_core::InboundMessage;
use uuid::Uuid;

use crate::blocklist::Blocklist;
use crate::dedup::DedupCache;
use crate::error::IngressError;
use crate::rate_limit::RateLimiter;
use crate::spam::SpamClassifier;
use crate::webhook_adapter::RequiredFields;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub rate_limit_capacity: u32,
    pub rate_limit_window: Duration,
    pub dedup_ttl: Duration,
    pub dedup_capacity: usize,
    pub blocklist_elevation_threshold: usize,
    pub blocklist_elevation_window: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rate_limit_capacity: 100,
            rate_limit_window: Duration::from_secs(60),
            dedup_ttl: Duration::from_secs(300),
            dedup_capacity: 100_000,
            blocklist_elevation_threshold: 5,
            blocklist_elevation_window: Duration::from_secs(3600),
        }
    }
}

pub struct Stage1Pipeline {
    blocklist: Blocklist,
    rate_limiter: RateLimiter,
    dedup: DedupCache,
    spam: SpamClassifier,
}

/// Outcome of running the pipeline on one inbound webhook call.
#[derive(Debug)]
pub enum Stage1Outcome {
    Accepted(InboundMessage),
    /// Accepted, but content heuristics flagged it — still returned to the
    /// caller for normalization, but the caller should not forward it
    /// downstream (spec §4.4 substep 6: "accepted but not forwarded").
    AcceptedButSuppressed { message: InboundMessage, rules_matched: Vec<&'static str> },
    Rejected(IngressError),
}

impl Stage1Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            blocklist: Blocklist::new(config.blocklist_elevation_threshold, config.blocklist_elevation_window),
            rate_limiter: RateLimiter::new(config.rate_limit_capacity, config.rate_limit_window),
            dedup: DedupCache::new(config.dedup_ttl, config.dedup_capacity),
            spam: SpamClassifier::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn run<A>(&self, adapter: &A, source_ip: &str, raw_body: &[u8], headers: &[(String, String)]) -> Stage1Outcome
    where
        A: raidcore_core::IngressAdapter + RequiredFields,
    {
        let trace_id = Uuid::new_v4();

        macro_rules! emit {
            ($stage:expr, $outcome:expr, $checks:expr, $start:expr) => {
                tracing::info!(
                    %trace_id,
                    stage = $stage,
                    outcome = $outcome,
                    checks_applied = $checks,
                    elapsed_ns = $start.elapsed().as_nanos() as u64,
                    "ingress stage 1 substep"
                );
                metrics::counter!("raidcore_ingress_stage_outcomes_total", "stage" => $stage, "outcome" => $outcome).increment(1);
            };
        }

        // 1. IP/user blocklist
        let start = Instant::now();
        if self.blocklist.is_blocked(source_ip) {
            emit!("blocklist", "rejected", 1, start);
            return Stage1Outcome::Rejected(IngressError::Blocked);
        }
        emit!("blocklist", "passed", 1, start);

        // 2. Adapter signature verification
        let start = Instant::now();
        if let Err(err) = adapter.verify(raw_body, headers).await {
            emit!("signature", "rejected", 1, start);
            let _ = err;
            return Stage1Outcome::Rejected(IngressError::InvalidSignature);
        }
        emit!("signature", "passed", 1, start);

        // 3. Rate limit
        let start = Instant::now();
        let parsed_peek: Option<InboundMessage> = adapter.parse(raw_body).ok();
        let user_key = parsed_peek.as_ref().map(|m| m.source_user_key.as_str()).unwrap_or("unknown");
        if let Err(retry_after_ms) = self.rate_limiter.check(source_ip, user_key) {
            emit!("rate_limit", "rejected", 1, start);
            if self.blocklist.record_rate_limit_event(source_ip) {
                tracing::warn!(%source_ip, "elevated to blocklist after repeated rate-limit violations");
            }
            return Stage1Outcome::Rejected(IngressError::RateLimited { retry_after_ms });
        }
        emit!("rate_limit", "passed", 1, start);

        // 4. Duplicate suppression
        let start = Instant::now();
        let message = match parsed_peek {
            Some(m) => m,
            None => match adapter.parse(raw_body) {
                Ok(m) => m,
                Err(_) => {
                    emit!("normalize", "rejected", 1, start);
                    return Stage1Outcome::Rejected(IngressError::SchemaInvalid("unparseable payload".into()));
                }
            },
        };

        if self.dedup.check_and_insert(adapter.platform(), &message.platform_message_id) {
            emit!("dedup", "rejected", 1, start);
            return Stage1Outcome::Rejected(IngressError::Duplicate);
        }
        emit!("dedup", "passed", 1, start);

        // 5. Payload schema validation
        let start = Instant::now();
        let required = adapter.required_fields();
        let missing = required.iter().any(|field| match *field {
            "source_user_key" => message.source_user_key.is_empty(),
            "room_key" => message.room_key.is_empty(),
            "platform_message_id" => message.platform_message_id.is_empty(),
            _ => false,
        });
        if missing {
            emit!("schema", "rejected", required.len() as u64, start);
            return Stage1Outcome::Rejected(IngressError::SchemaInvalid("required field missing".into()));
        }
        emit!("schema", "passed", required.len() as u64, start);

        // 6. Content heuristics
        let start = Instant::now();
        let rules_matched = message.text.as_deref().map(|t| self.spam.matches(t)).unwrap_or_default();
        emit!("spam", if rules_matched.is_empty() { "passed" } else { "flagged" }, rules_matched.len() as u64, start);

        // 7. Normalization already happened via adapter.parse above.
        if rules_matched.is_empty() {
            Stage1Outcome::Accepted(message)
        } else {
            Stage1Outcome::AcceptedButSuppressed { message, rules_matched }
        }
    }
}
