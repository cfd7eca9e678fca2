//! Memory Store (spec §4.2): CRUD over conversational items, with
//! optional embedding vectors and semantic search, built atop the
//! Datastore Router and a Qdrant-backed [`VectorStore`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use raidcore_core::{EmbedOnWriteAllowList, EmbeddingClient, MemoryBody, MemoryItem};
use raidcore_persistence::Router;
use scylla::frame::value::CqlTimestamp;
use scylla::IntoTypedRows;
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::vector_store::VectorStore;

const MAX_RECENT_LIMIT: usize = 1000;

pub struct MemoryStore {
    router: Arc<Router>,
    vector_store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    allow_list: EmbedOnWriteAllowList,
    keyspace: String,
}

impl MemoryStore {
    pub fn new(
        router: Arc<Router>,
        vector_store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        allow_list: EmbedOnWriteAllowList,
    ) -> Self {
        let keyspace = router.client().keyspace().to_string();
        Self {
            router,
            vector_store,
            embedder,
            allow_list,
            keyspace,
        }
    }

    /// Writes the item; if `embedding` is absent, `body.text` is non-empty,
    /// and the item kind is in the embed-on-write allow-list, synchronously
    /// computes an embedding and stores it. Embedding failure downgrades to
    /// "stored without vector" and logs a warning rather than failing the
    /// call (spec §4.2).
    pub async fn put(&self, mut item: MemoryItem) -> Result<Uuid> {
        if item.embedding.is_none() && !item.body.text.is_empty() && self.allow_list.allows(&item.kind) {
            match self.embedder.embed(&item.body.text).await {
                Ok(vector) => item.embedding = Some(vector),
                Err(err) => {
                    tracing::warn!(item_id = %item.id, error = %err, "embedding failed, storing without vector");
                }
            }
        }

        self.insert_row(&item).await?;

        if let Some(vector) = &item.embedding {
            let mut payload = HashMap::new();
            payload.insert("room_id".to_string(), item.room_id.clone());
            payload.insert("agent_id".to_string(), item.agent_id.clone());
            payload.insert("entity_id".to_string(), item.entity_id.clone());
            payload.insert("kind".to_string(), item.kind.clone());
            payload.insert(
                "item_json".to_string(),
                serde_json::to_string(&item).map_err(|e| MemoryError::Decode(e.to_string()))?,
            );

            if let Err(err) = self.vector_store.upsert(&item.id.to_string(), vector, &payload).await {
                tracing::warn!(item_id = %item.id, error = %err, "vector upsert failed, item remains queryable via get_recent only");
            }
        }

        Ok(item.id)
    }

    pub async fn put_many(&self, items: Vec<MemoryItem>) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            ids.push(self.put(item).await?);
        }
        Ok(ids)
    }

    async fn insert_row(&self, item: &MemoryItem) -> Result<()> {
        let body_json = serde_json::to_string(&item.body).map_err(|e| MemoryError::Decode(e.to_string()))?;
        let embedding: Vec<f32> = item.embedding.clone().unwrap_or_default();

        let query = format!(
            "INSERT INTO {}.memory_items (room_id, created_at, item_id, agent_id, entity_id, kind, body_json, embedding) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.router
            .run_simple(
                &query,
                (
                    &item.room_id,
                    CqlTimestamp(item.created_at.timestamp_millis()),
                    item.id,
                    &item.agent_id,
                    &item.entity_id,
                    &item.kind,
                    body_json,
                    embedding,
                ),
            )
            .await?;
        Ok(())
    }

    /// Newest-first by `created_at`; `limit` is clamped to 1000 (spec §4.2).
    /// A read-only SELECT is safe to retry, so this runs idempotent.
    pub async fn get_recent(&self, room_id: &str, limit: usize, kind_filter: Option<&str>) -> Result<Vec<MemoryItem>> {
        let limit = limit.min(MAX_RECENT_LIMIT);

        let query = format!(
            "SELECT item_id, agent_id, entity_id, kind, body_json, embedding, created_at \
             FROM {}.memory_items WHERE room_id = ? LIMIT ?",
            self.keyspace
        );
        let result = self.router.run_simple_idempotent(&query, (room_id, limit as i32)).await?;
        let Some(rows) = result.rows else { return Ok(vec![]) };

        let mut items = Vec::new();
        for row in rows.into_typed::<(Uuid, String, String, String, String, Option<Vec<f32>>, CqlTimestamp)>() {
            let (item_id, agent_id, entity_id, kind, body_json, embedding, created_at) =
                row.map_err(|e| MemoryError::Decode(e.to_string()))?;

            if let Some(ref filter) = kind_filter {
                if &kind != filter {
                    continue;
                }
            }

            let body: MemoryBody = serde_json::from_str(&body_json).map_err(|e| MemoryError::Decode(e.to_string()))?;
            items.push(MemoryItem {
                id: item_id,
                agent_id,
                room_id: room_id.to_string(),
                entity_id,
                kind,
                body,
                embedding: embedding.filter(|v| !v.is_empty()),
                created_at: chrono::DateTime::from_timestamp_millis(created_at.0).unwrap_or_else(Utc::now),
            });
        }

        Ok(items)
    }

    /// Embeds `text` with the configured embedding client, for callers that
    /// need a query vector to hand to [`MemoryStore::search`] themselves.
    pub async fn embed_for_search(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await.map_err(|e| MemoryError::Search(e.to_string()))
    }

    /// Top-K by cosine similarity ≥ `min_similarity`, ties broken by
    /// `created_at` descending (spec §4.2). Uses the session pool via the
    /// vector store, which holds its own connection.
    pub async fn search(
        &self,
        query_vec: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<(MemoryItem, f32)>> {
        let results = self.vector_store.search(query_vec, limit, min_similarity).await?;

        let mut scored = Vec::with_capacity(results.len());
        for result in results {
            let Some(item_json) = result.payload.get("item_json") else {
                continue;
            };
            let item: MemoryItem = serde_json::from_str(item_json).map_err(|e| MemoryError::Decode(e.to_string()))?;
            scored.push((item, result.similarity));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.created_at.cmp(&a.0.created_at))
        });

        Ok(scored)
    }
}
