//! ScyllaDB schema creation (spec §3 data model tables).

use scylla::Session;

use crate::error::PersistenceError;

pub async fn create_keyspace(session: &Session, keyspace: &str, replication_factor: u8) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create keyspace: {e}")))?;

    Ok(())
}

pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    let sessions_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {ks}.sessions (
            session_id UUID,
            agent_id TEXT,
            user_id TEXT,
            room_id TEXT,
            kind TEXT,
            state TEXT,
            created_at TIMESTAMP,
            last_activity_at TIMESTAMP,
            expires_at TIMESTAMP,
            timeout_ms BIGINT,
            renewal_policy TEXT,
            message_count INT,
            metadata_json TEXT,
            raid_json TEXT,
            PRIMARY KEY (session_id)
        )
        "#,
        ks = keyspace
    );
    session
        .query_unpaged(sessions_table, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create sessions table: {e}")))?;

    let sessions_by_room = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {ks}.sessions_by_room (
            agent_id TEXT,
            room_id TEXT,
            session_id UUID,
            state TEXT,
            PRIMARY KEY ((agent_id, room_id), session_id)
        )
        "#,
        ks = keyspace
    );
    session
        .query_unpaged(sessions_by_room, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create sessions_by_room table: {e}")))?;

    let raid_actions = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {ks}.raid_actions (
            raid_id TEXT,
            action_id UUID,
            participant_id TEXT,
            objective_type TEXT,
            target TEXT,
            submitted_at TIMESTAMP,
            verified_at TIMESTAMP,
            verified BOOLEAN,
            rejected BOOLEAN,
            points BIGINT,
            proof BLOB,
            PRIMARY KEY ((raid_id), submitted_at, action_id)
        ) WITH CLUSTERING ORDER BY (submitted_at DESC, action_id DESC)
        "#,
        ks = keyspace
    );
    session
        .query_unpaged(raid_actions, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create raid_actions table: {e}")))?;

    let memory_items = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {ks}.memory_items (
            room_id TEXT,
            created_at TIMESTAMP,
            item_id UUID,
            agent_id TEXT,
            entity_id TEXT,
            kind TEXT,
            body_json TEXT,
            embedding LIST<FLOAT>,
            PRIMARY KEY ((room_id), created_at, item_id)
        ) WITH CLUSTERING ORDER BY (created_at DESC, item_id DESC)
        "#,
        ks = keyspace
    );
    session
        .query_unpaged(memory_items, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create memory_items table: {e}")))?;

    let identity_bindings = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {ks}.identity_bindings (
            platform TEXT,
            platform_id TEXT,
            internal_id TEXT,
            verified BOOLEAN,
            linked_at TIMESTAMP,
            PRIMARY KEY ((platform, platform_id))
        )
        "#,
        ks = keyspace
    );
    session
        .query_unpaged(identity_bindings, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create identity_bindings table: {e}")))?;

    let identity_by_internal = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {ks}.identity_by_internal (
            internal_id TEXT,
            platform TEXT,
            platform_id TEXT,
            verified BOOLEAN,
            linked_at TIMESTAMP,
            PRIMARY KEY ((internal_id), platform, platform_id)
        )
        "#,
        ks = keyspace
    );
    session
        .query_unpaged(identity_by_internal, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create identity_by_internal table: {e}")))?;

    tracing::info!("all tables created successfully");
    Ok(())
}
