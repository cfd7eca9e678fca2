//! In-memory [`SessionStore`] fake, gated behind the `test-util` feature
//! (spec §8: router/store tests against in-memory fakes rather than a live
//! Scylla instance).

use async_trait::async_trait;
use dashmap::DashMap;
use raidcore_core::Session;
use uuid::Uuid;

use crate::error::Result;
use crate::sessions::SessionStore;

#[derive(Default)]
pub struct InMemorySessionStore {
    rows: DashMap<Uuid, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<()> {
        self.rows.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.rows.get(&id).map(|r| r.value().clone()))
    }

    async fn update(&self, session: &Session) -> Result<()> {
        self.rows.insert(session.id, session.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.rows.remove(&id);
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<Session>> {
        Ok(self.rows.iter().map(|r| r.value().clone()).collect())
    }

    async fn find_active_in_room(&self, agent_id: &str, room_id: &str) -> Result<Vec<Uuid>> {
        Ok(self
            .rows
            .iter()
            .filter(|r| r.value().agent_id == agent_id && r.value().room_id == room_id && r.value().is_active())
            .map(|r| *r.key())
            .collect())
    }
}
