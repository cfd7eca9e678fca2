//! Datastore Router (spec §4.1).
//!
//! Two logically independent pools guard a single shared `scylla::Session`:
//! a *transaction pool* for short-lived statements and a *session pool* for
//! long-running, joining, or vector-involving queries. Pool membership is a
//! bounded semaphore; acquiring a permit is the "checkout". A checkout that
//! can't get a permit within the wait-queue bound fails fast rather than
//! queuing indefinitely.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scylla::frame::value::ValueList;
use scylla::transport::iterator::RowIterator;
use scylla::QueryResult;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

/// Which pool a query plan should run against (spec §4.1 `classify`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Simple,
    Complex,
}

/// Crude heuristic classifier over a query's textual plan: a query touching
/// more than one relation, aggregating, joining, windowing, or doing a
/// vector-similarity search is "complex"; everything else is "simple".
pub fn classify(plan: &str) -> Pool {
    let lowered = plan.to_ascii_lowercase();
    let relation_count = lowered.matches(" from ").count() + lowered.matches(" join ").count();
    let is_complex = relation_count > 1
        || lowered.contains("join")
        || lowered.contains("group by")
        || lowered.contains("over (")
        || lowered.contains("vector")
        || lowered.contains("order by similarity");

    if is_complex {
        Pool::Complex
    } else {
        Pool::Simple
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub pool_tx_size: u32,
    pub pool_sess_size: u32,
    pub wait_queue_depth: u32,
    pub simple_timeout: Duration,
    pub complex_timeout: Duration,
    pub health_interval: Duration,
    pub max_retries: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            pool_tx_size: 20,
            pool_sess_size: 5,
            wait_queue_depth: 100,
            simple_timeout: Duration::from_secs(5),
            complex_timeout: Duration::from_secs(30),
            health_interval: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

struct PoolState {
    semaphore: Semaphore,
    waiters: AtomicU32,
    depth_limit: u32,
    consecutive_failures: AtomicU32,
    degraded: std::sync::atomic::AtomicBool,
}

impl PoolState {
    fn new(size: u32, depth_limit: u32) -> Self {
        Self {
            semaphore: Semaphore::new(size as usize),
            waiters: AtomicU32::new(0),
            depth_limit,
            consecutive_failures: AtomicU32::new(0),
            degraded: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }
}

/// Routes queries to the transaction pool or session pool, applying the
/// retry/backoff/backpressure contract of spec §4.1.
pub struct Router {
    client: ScyllaClient,
    config: RouterConfig,
    tx_pool: Arc<PoolState>,
    sess_pool: Arc<PoolState>,
    checkout_count: AtomicU64,
}

impl Router {
    pub fn new(client: ScyllaClient, config: RouterConfig) -> Self {
        let tx_pool = Arc::new(PoolState::new(config.pool_tx_size, config.wait_queue_depth));
        let sess_pool = Arc::new(PoolState::new(config.pool_sess_size, config.wait_queue_depth));

        Self {
            client,
            config,
            tx_pool,
            sess_pool,
            checkout_count: AtomicU64::new(0),
        }
    }

    pub fn classify(&self, plan: &str) -> Pool {
        classify(plan)
    }

    /// Run a short-lived statement against the transaction pool.
    pub async fn run_simple<V: ValueList + Clone>(&self, query: &str, values: V) -> Result<QueryResult, PersistenceError> {
        self.run(Pool::Simple, query, values, false).await
    }

    /// Run a long-running/joining/vector query against the session pool.
    pub async fn run_complex<V: ValueList + Clone>(&self, query: &str, values: V) -> Result<QueryResult, PersistenceError> {
        self.run(Pool::Complex, query, values, false).await
    }

    /// Same as [`Router::run_simple`] but marks the statement idempotent so
    /// transient connection errors are retried with backoff.
    pub async fn run_simple_idempotent<V: ValueList + Clone>(
        &self,
        query: &str,
        values: V,
    ) -> Result<QueryResult, PersistenceError> {
        self.run(Pool::Simple, query, values, true).await
    }

    pub async fn run_rows_paged<V: ValueList>(&self, query: &str, values: V) -> Result<RowIterator, PersistenceError> {
        let pool = self.pool_state(Pool::Complex);
        let _permit = self.checkout(pool, Pool::Complex).await?;
        self.client
            .session()
            .query_iter(query.to_string(), values)
            .await
            .map_err(|e| {
                self.note_failure(pool);
                PersistenceError::from(e)
            })
    }

    async fn run<V: ValueList + Clone>(
        &self,
        pool_kind: Pool,
        query: &str,
        values: V,
        idempotent: bool,
    ) -> Result<QueryResult, PersistenceError> {
        let pool = self.pool_state(pool_kind);
        if pool.is_degraded() {
            return Err(PersistenceError::PoolDegraded(format!("{pool_kind:?} pool is degraded")));
        }

        let _permit = self.checkout(pool, pool_kind).await?;
        self.checkout_count.fetch_add(1, Ordering::Relaxed);

        let attempts = if idempotent { self.config.max_retries + 1 } else { 1 };
        let mut backoff = Duration::from_millis(50);
        let mut last_err = None;

        for attempt in 0..attempts {
            match self.client.session().query_unpaged(query.to_string(), values.clone()).await {
                Ok(result) => {
                    pool.consecutive_failures.store(0, Ordering::Relaxed);
                    return Ok(result);
                }
                Err(err) => {
                    last_err = Some(err);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 4;
                    }
                }
            }
        }

        self.note_failure(pool);
        Err(PersistenceError::from(last_err.expect("attempts is always >= 1")))
    }

    fn pool_state(&self, pool: Pool) -> &Arc<PoolState> {
        match pool {
            Pool::Simple => &self.tx_pool,
            Pool::Complex => &self.sess_pool,
        }
    }

    fn note_failure(&self, pool: &Arc<PoolState>) {
        let failures = pool.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= 3 {
            pool.degraded.store(true, Ordering::Relaxed);
            tracing::warn!(failures, "datastore pool marked degraded after consecutive failures");
        }
    }

    async fn checkout<'a>(
        &self,
        pool: &'a Arc<PoolState>,
        kind: Pool,
    ) -> Result<tokio::sync::SemaphorePermit<'a>, PersistenceError> {
        if pool.waiters.load(Ordering::Relaxed) >= pool.depth_limit {
            metrics::counter!("raidcore_pool_backpressure_total", "pool" => pool_label(kind)).increment(1);
            return Err(PersistenceError::BackpressureExceeded);
        }

        pool.waiters.fetch_add(1, Ordering::Relaxed);
        let wait_deadline = match kind {
            Pool::Simple => self.config.simple_timeout,
            Pool::Complex => self.config.complex_timeout,
        };

        let start = std::time::Instant::now();
        let result = timeout(wait_deadline, pool.semaphore.acquire()).await;
        pool.waiters.fetch_sub(1, Ordering::Relaxed);

        metrics::histogram!("raidcore_pool_checkout_seconds", "pool" => pool_label(kind))
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_closed)) => Err(PersistenceError::PoolDegraded("semaphore closed".into())),
            Err(_elapsed) => Err(PersistenceError::PoolTimeout),
        }
    }

    /// Runs a trivial query against each pool; three consecutive failures on
    /// a pool mark it degraded until a probe succeeds again (spec §4.1).
    pub async fn health_probe(&self) {
        for (pool, kind) in [(&self.tx_pool, Pool::Simple), (&self.sess_pool, Pool::Complex)] {
            match self.client.session().query_unpaged("SELECT now() FROM system.local", &[]).await {
                Ok(_) => {
                    pool.consecutive_failures.store(0, Ordering::Relaxed);
                    pool.degraded.store(false, Ordering::Relaxed);
                }
                Err(err) => {
                    tracing::warn!(?kind, error = %err, "health probe failed");
                    self.note_failure(pool);
                }
            }
        }
    }

    pub fn spawn_health_loop(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken) {
        let interval_dur = self.config.health_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_dur);
            loop {
                tokio::select! {
                    _ = interval.tick() => self.health_probe().await,
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    pub fn client(&self) -> &ScyllaClient {
        &self.client
    }

    /// `(simple_degraded, complex_degraded)`, for the `/health` endpoint.
    pub fn pool_health(&self) -> (bool, bool) {
        (self.tx_pool.is_degraded(), self.sess_pool.is_degraded())
    }
}

fn pool_label(pool: Pool) -> &'static str {
    match pool {
        Pool::Simple => "simple",
        Pool::Complex => "complex",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_picks_complex_for_joins_and_aggregates() {
        assert_eq!(classify("SELECT * FROM sessions WHERE id = ?"), Pool::Simple);
        assert_eq!(classify("SELECT a.* FROM a JOIN b ON a.id = b.id"), Pool::Complex);
        assert_eq!(classify("SELECT count(*) FROM sessions GROUP BY room_id"), Pool::Complex);
        assert_eq!(classify("SELECT * FROM memory_items ORDER BY similarity(embedding) DESC"), Pool::Complex);
    }
}
