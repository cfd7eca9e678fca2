//! ScyllaDB-backed persistence for the session/raid coordination core:
//! the Datastore Router (spec §4.1), session/raid table CRUD (spec §3), and
//! the Identity Resolver (spec §4.3).

pub mod client;
pub mod error;
#[cfg(feature = "test-util")]
pub mod fakes;
pub mod identities;
pub mod raid_actions;
pub mod router;
pub mod schema;
pub mod sessions;

pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use identities::IdentityResolver;
pub use raid_actions::RaidActionLog;
pub use router::{classify, Pool, Router, RouterConfig};
pub use sessions::{SessionStore, SessionTable};

use std::sync::Arc;

/// Connects, ensures schema, and wires the router + table accessors.
pub async fn init(config: ScyllaConfig, router_config: RouterConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    let router = Arc::new(Router::new(client, router_config));
    let sessions = SessionTable::new(router.clone());
    let identities = IdentityResolver::new(router.clone());
    let raid_actions = RaidActionLog::new(router.clone());

    Ok(PersistenceLayer {
        router,
        sessions,
        identities,
        raid_actions,
    })
}

pub struct PersistenceLayer {
    pub router: Arc<Router>,
    pub sessions: SessionTable,
    pub identities: IdentityResolver,
    pub raid_actions: RaidActionLog,
}
