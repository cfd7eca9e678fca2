//! Identity Resolver (spec §4.3): maps `(platform, platform_id)` to a stable
//! internal id and supports merging aliases.

use std::sync::Arc;

use chrono::Utc;
use raidcore_core::IdentityBinding;
use scylla::frame::value::CqlTimestamp;
use scylla::IntoTypedRows;
use uuid::Uuid;

use crate::error::{PersistenceError, Result};
use crate::router::Router;

pub struct IdentityResolver {
    router: Arc<Router>,
    keyspace: String,
}

impl IdentityResolver {
    pub fn new(router: Arc<Router>) -> Self {
        let keyspace = router.client().keyspace().to_string();
        Self { router, keyspace }
    }

    /// Idempotent: returns the existing binding's internal id, or allocates
    /// and persists a new one (spec §4.3).
    pub async fn resolve(&self, platform: &str, platform_id: &str) -> Result<String> {
        let query = format!(
            "SELECT internal_id FROM {}.identity_bindings WHERE platform = ? AND platform_id = ?",
            self.keyspace
        );
        let result = self.router.run_simple(&query, (platform, platform_id)).await?;
        if let Some(rows) = result.rows {
            for row in rows.into_typed::<(String,)>() {
                let (internal_id,) = row.map_err(|e| PersistenceError::Decode(e.to_string()))?;
                return Ok(internal_id);
            }
        }

        let internal_id = Uuid::new_v4().to_string();
        self.bind(&internal_id, platform, platform_id, false).await?;
        Ok(internal_id)
    }

    async fn bind(&self, internal_id: &str, platform: &str, platform_id: &str, verified: bool) -> Result<()> {
        let linked_at = CqlTimestamp(Utc::now().timestamp_millis());

        let into_bindings = format!(
            "INSERT INTO {}.identity_bindings (platform, platform_id, internal_id, verified, linked_at) \
             VALUES (?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.router
            .run_simple(&into_bindings, (platform, platform_id, internal_id, verified, linked_at))
            .await?;

        let into_by_internal = format!(
            "INSERT INTO {}.identity_by_internal (internal_id, platform, platform_id, verified, linked_at) \
             VALUES (?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.router
            .run_simple(&into_by_internal, (internal_id, platform, platform_id, verified, linked_at))
            .await?;

        Ok(())
    }

    pub async fn list_bindings(&self, internal_id: &str) -> Result<Vec<IdentityBinding>> {
        let query = format!(
            "SELECT platform, platform_id, verified, linked_at FROM {}.identity_by_internal WHERE internal_id = ?",
            self.keyspace
        );
        let result = self.router.run_simple(&query, (internal_id,)).await?;
        let Some(rows) = result.rows else { return Ok(vec![]) };

        let mut bindings = Vec::new();
        for row in rows.into_typed::<(String, String, bool, CqlTimestamp)>() {
            let (platform, platform_id, verified, linked_at) = row.map_err(|e| PersistenceError::Decode(e.to_string()))?;
            bindings.push(IdentityBinding {
                internal_id: internal_id.to_string(),
                platform,
                platform_id,
                verified,
                linked_at: chrono::DateTime::from_timestamp_millis(linked_at.0).unwrap_or_else(Utc::now),
            });
        }
        Ok(bindings)
    }

    /// Merges two identity sets, surviving as the lexicographically smaller
    /// id, rewriting all bindings atomically from the router's point of view
    /// (spec §4.3). Fails with `ConflictingVerification` if both sides hold
    /// verified bindings for the same platform with different `platform_id`.
    pub async fn link(&self, internal_id_a: &str, internal_id_b: &str) -> Result<String> {
        if internal_id_a == internal_id_b {
            return Ok(internal_id_a.to_string());
        }

        let bindings_a = self.list_bindings(internal_id_a).await?;
        let bindings_b = self.list_bindings(internal_id_b).await?;

        for a in &bindings_a {
            if !a.verified {
                continue;
            }
            for b in &bindings_b {
                if b.verified && a.platform == b.platform && a.platform_id != b.platform_id {
                    return Err(PersistenceError::ConflictingVerification);
                }
            }
        }

        let (survivor, absorbed, absorbed_bindings) = if internal_id_a < internal_id_b {
            (internal_id_a, internal_id_b, bindings_b)
        } else {
            (internal_id_b, internal_id_a, bindings_a)
        };

        for binding in absorbed_bindings {
            self.bind(survivor, &binding.platform, &binding.platform_id, binding.verified).await?;

            let delete = format!(
                "DELETE FROM {}.identity_by_internal WHERE internal_id = ? AND platform = ? AND platform_id = ?",
                self.keyspace
            );
            self.router.run_simple(&delete, (absorbed, &binding.platform, &binding.platform_id)).await?;
        }

        Ok(survivor.to_string())
    }
}
