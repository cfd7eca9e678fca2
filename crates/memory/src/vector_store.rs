//! Qdrant-backed vector storage for memory item embeddings.

use std::collections::HashMap;

use qdrant_client::qdrant::{
    value::Kind, vectors_config::Config as VectorsConfigOneof, CreateCollectionBuilder, DeletePointsBuilder,
    Distance, PointId, PointStruct, PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;

use crate::error::MemoryError;

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub endpoint: String,
    pub collection: String,
    pub vector_dim: usize,
    pub api_key: Option<String>,
}

pub struct VectorStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub id: String,
    pub similarity: f32,
    pub payload: HashMap<String, String>,
}

impl VectorStore {
    pub async fn connect(config: VectorStoreConfig) -> Result<Self, MemoryError> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref key) = config.api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder.build().map_err(|e| MemoryError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Creates the collection if absent; if it already exists, verifies its
    /// vector size matches `config.vector_dim` rather than silently trusting
    /// it, since a dimension mismatch would surface as opaque upsert
    /// failures later instead of a clean startup error.
    pub async fn ensure_collection(&self) -> Result<(), MemoryError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection)
                        .vectors_config(VectorParamsBuilder::new(self.config.vector_dim as u64, Distance::Cosine)),
                )
                .await
                .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
            return Ok(());
        }

        let info = self
            .client
            .collection_info(&self.config.collection)
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;

        let existing_dim = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|vc| vc.config)
            .and_then(|config| match config {
                VectorsConfigOneof::Params(p) => Some(p.size as usize),
                VectorsConfigOneof::ParamsMap(_) => None,
            })
            .ok_or_else(|| {
                MemoryError::VectorStore(format!("could not determine vector size for collection {}", self.config.collection))
            })?;

        if existing_dim != self.config.vector_dim {
            return Err(MemoryError::DimensionMismatch { expected: self.config.vector_dim, got: existing_dim });
        }

        Ok(())
    }

    pub async fn upsert(&self, id: &str, vector: &[f32], payload: &HashMap<String, String>) -> Result<(), MemoryError> {
        if vector.len() != self.config.vector_dim {
            return Err(MemoryError::DimensionMismatch {
                expected: self.config.vector_dim,
                got: vector.len(),
            });
        }

        let mut qdrant_payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        for (k, v) in payload {
            qdrant_payload.insert(k.clone(), v.clone().into());
        }

        let point = PointStruct::new(id.to_string(), vector.to_vec(), qdrant_payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, vec![point]))
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;

        Ok(())
    }

    pub async fn search(&self, query_vector: &[f32], limit: usize, min_similarity: f32) -> Result<Vec<VectorSearchResult>, MemoryError> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.config.collection, query_vector.to_vec(), limit as u64)
                    .with_payload(true)
                    .score_threshold(min_similarity),
            )
            .await
            .map_err(|e| MemoryError::Search(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| {
                let mut payload = HashMap::new();
                for (k, v) in point.payload {
                    if let Some(Kind::StringValue(s)) = v.kind {
                        payload.insert(k, s);
                    }
                }

                let id = point
                    .id
                    .map(|pid| match pid.point_id_options {
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
                        None => String::new(),
                    })
                    .unwrap_or_default();

                VectorSearchResult {
                    id,
                    similarity: point.score,
                    payload,
                }
            })
            .collect())
    }

    pub async fn delete(&self, ids: &[String]) -> Result<(), MemoryError> {
        let points: Vec<PointId> = ids.iter().map(|id| PointId::from(id.clone())).collect();
        self.client
            .delete_points(DeletePointsBuilder::new(&self.config.collection).points(PointsIdsList { ids: points }))
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.config.vector_dim
    }
}
