//! HTTP surface (spec §6): session lifecycle, raid lifecycle, webhook
//! ingress, health, and metrics.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router as AxumRouter};
use raidcore_core::{
    Category, Classification, CoreError, CreateSessionParams, Metadata, ModelRequest, RenewalPolicy, Session,
    SessionKind,
};
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ServerError;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::events_ws;

pub fn create_router(state: AppState) -> AxumRouter {
    let cors = build_cors_layer(&state);

    AxumRouter::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/renew", post(renew_session))
        .route("/sessions/:id/heartbeat", post(heartbeat_session))
        .route("/sessions/:id/messages", post(post_message).get(list_messages))
        .route("/raids", post(create_raid))
        .route("/raids/:id/join", post(join_raid))
        .route("/raids/:id/actions", post(submit_action))
        .route("/raids/:id/leaderboard", get(raid_leaderboard))
        .route("/raids/:id/metrics", get(raid_metrics))
        .route("/raids/:id/complete", post(complete_raid))
        .route("/webhooks/:platform", post(ingest_webhook))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/events", get(events_ws))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(state: &AppState) -> CorsLayer {
    if !state.config.server.cors_enabled {
        return CorsLayer::new();
    }

    let mut layer = CorsLayer::new().allow_methods([Method::GET, Method::POST, Method::DELETE]);
    layer = if state.config.server.cors_origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<_> = state
            .config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(origins)
    };
    layer.allow_headers(Any)
}

// -- sessions -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    agent_id: String,
    user_id: Option<String>,
    room_id: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    timeout_ms: Option<i64>,
}

fn session_kind_from(kind: Option<&str>) -> SessionKind {
    match kind {
        Some("raid") => SessionKind::Raid,
        _ => SessionKind::Conversation,
    }
}

async fn create_session(State(state): State<AppState>, Json(req): Json<CreateSessionRequest>) -> Result<impl IntoResponse, ServerError> {
    let timeout_ms = req.timeout_ms.unwrap_or(state.config.session.default_timeout_ms);
    let session = state
        .sessions
        .create(CreateSessionParams {
            agent_id: req.agent_id,
            user_id: req.user_id,
            room_id: req.room_id,
            kind: session_kind_from(req.kind.as_deref()),
            timeout_ms,
            renewal_policy: RenewalPolicy::OnActivity,
            metadata: Metadata::new(),
        })
        .await?;
    Ok(Json(session))
}

fn parse_uuid(raw: &str) -> Result<Uuid, ServerError> {
    raw.parse().map_err(|_| ServerError::InvalidRequest(format!("invalid id: {raw}")))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ServerError> {
    let id = parse_uuid(&id)?;
    let session = state.sessions.get(id).await?.ok_or(CoreError::SessionNotFound)?;
    Ok(Json(session))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ServerError> {
    let id = parse_uuid(&id)?;
    state.sessions.end(id, "client requested").await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct RenewRequest {
    extra_ms: Option<i64>,
}

async fn renew_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenewRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let id = parse_uuid(&id)?;
    let expires_at = state.sessions.renew(id, req.extra_ms).await?;
    Ok(Json(serde_json::json!({ "expires_at": expires_at })))
}

async fn heartbeat_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ServerError> {
    let id = parse_uuid(&id)?;
    state.sessions.heartbeat(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PostMessageRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct PostMessageResponse {
    reply: String,
    classification: Classification,
}

async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let id = parse_uuid(&id)?;
    let session = state.sessions.get(id).await?.ok_or(CoreError::SessionNotFound)?;
    if !session.is_active() {
        return Err(CoreError::SessionNotActive.into());
    }
    state.sessions.update_activity(id, 1).await?;

    let classification = raidcore_agent::classify(&req.text);

    let recent = state.memory.get_recent(&session.room_id, 20, None).await?;
    let semantic = if let Ok(query_vec) = state.memory.embed_for_search(&req.text).await {
        state.memory.search(&query_vec, 5, 0.5).await.unwrap_or_default()
    } else {
        vec![]
    };
    let identity = None;

    let request: ModelRequest = raidcore_agent::compose(
        &session,
        &req.text,
        &classification,
        &recent,
        &semantic,
        identity,
        &state.personality,
    );

    let response = state.dispatcher.dispatch(id, &session.agent_id, &session.room_id, request).await?;

    Ok(Json(PostMessageResponse { reply: response.text, classification }))
}

#[derive(Debug, Deserialize)]
struct ListMessagesQuery {
    cursor: Option<String>,
    limit: Option<usize>,
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let id = parse_uuid(&id)?;
    let session = state.sessions.get(id).await?.ok_or(CoreError::SessionNotFound)?;
    let limit = query.limit.unwrap_or(50).min(1000);

    let mut items = state.memory.get_recent(&session.room_id, limit, Some("conversation_turn")).await?;
    if let Some(cursor) = query.cursor.as_deref() {
        if let Ok(cursor_time) = cursor.parse::<chrono::DateTime<chrono::Utc>>() {
            items.retain(|item| item.created_at < cursor_time);
        }
    }

    let next_cursor = items.last().map(|item| item.created_at.to_rfc3339());
    Ok(Json(serde_json::json!({ "items": items, "next_cursor": next_cursor })))
}

// -- raids ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateRaidRequest {
    agent_id: String,
    target_ref: String,
    objectives: Vec<raidcore_core::Objective>,
    max_participants: u32,
    duration_ms: i64,
    #[serde(default)]
    auto_start: bool,
}

async fn create_raid(State(state): State<AppState>, Json(req): Json<CreateRaidRequest>) -> Result<impl IntoResponse, ServerError> {
    let session = state
        .raids
        .create(raidcore_agent::CreateRaidParams {
            agent_id: req.agent_id,
            target_ref: req.target_ref,
            objectives: req.objectives,
            max_participants: req.max_participants,
            duration_ms: req.duration_ms,
            auto_start: req.auto_start,
        })
        .await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
struct JoinRaidRequest {
    participant_id: String,
    platform_id: String,
    display_name: String,
    #[serde(default)]
    secondary_id: Option<String>,
}

async fn join_raid(
    State(state): State<AppState>,
    Path(raid_id): Path<String>,
    Json(req): Json<JoinRaidRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let participant = state
        .raids
        .join(
            &raid_id,
            raidcore_agent::JoinIdentity {
                participant_id: req.participant_id,
                platform_id: req.platform_id,
                display_name: req.display_name,
                secondary_id: req.secondary_id,
            },
        )
        .await?;
    Ok(Json(participant))
}

#[derive(Debug, Deserialize)]
struct SubmitActionRequest {
    participant_id: String,
    objective_type: raidcore_core::ObjectiveType,
    target: String,
    #[serde(default)]
    proof: Option<Vec<u8>>,
}

async fn submit_action(
    State(state): State<AppState>,
    Path(raid_id): Path<String>,
    Json(req): Json<SubmitActionRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let action = Arc::clone(&state.raids)
        .record_action(
            &raid_id,
            raidcore_agent::SubmittedAction {
                participant_id: req.participant_id,
                objective_type: req.objective_type,
                target: req.target,
                proof: req.proof,
            },
        )
        .await?;
    Ok(Json(action))
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
}

async fn raid_leaderboard(
    State(state): State<AppState>,
    Path(raid_id): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let limit = query.limit.unwrap_or(10).min(500);
    let leaderboard = state.raids.leaderboard(&raid_id, limit).await?;
    Ok(Json(leaderboard))
}

async fn raid_metrics(State(state): State<AppState>, Path(raid_id): Path<String>) -> Result<impl IntoResponse, ServerError> {
    let metrics = state.raids.metrics(&raid_id).await?;
    Ok(Json(serde_json::json!({
        "totals": metrics.totals,
        "time_remaining_ms": metrics.time_remaining_ms,
        "completion_ratio": metrics.completion_ratio,
    })))
}

#[derive(Debug, Deserialize)]
struct CompleteRaidRequest {
    #[serde(default = "default_reason")]
    reason: String,
}

fn default_reason() -> String {
    "manual completion".to_string()
}

async fn complete_raid(
    State(state): State<AppState>,
    Path(raid_id): Path<String>,
    Json(req): Json<CompleteRaidRequest>,
) -> Result<impl IntoResponse, ServerError> {
    state.raids.complete(&raid_id, &req.reason).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// -- ingress ----------------------------------------------------------------

async fn ingest_webhook(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, ServerError> {
    let adapter = state
        .webhook_adapter(&platform)
        .ok_or_else(|| ServerError::InvalidRequest(format!("unknown platform: {platform}")))?;

    let header_pairs: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or_default().to_string()))
        .collect();

    match state.ingress.run(adapter, "0.0.0.0", &body, &header_pairs).await {
        raidcore_ingress::Stage1Outcome::Accepted(message) => {
            route_inbound(&state, message).await?;
            Ok(axum::http::StatusCode::ACCEPTED)
        }
        raidcore_ingress::Stage1Outcome::AcceptedButSuppressed { .. } => Ok(axum::http::StatusCode::ACCEPTED),
        raidcore_ingress::Stage1Outcome::Rejected(err) => Err(CoreError::from(err).into()),
    }
}

async fn route_inbound(state: &AppState, message: raidcore_core::InboundMessage) -> Result<(), ServerError> {
    let internal_id = state.identities.resolve(&message.source_platform, &message.source_user_key).await.map_err(CoreError::from)?;

    let session = state
        .sessions
        .find_or_create(&message.source_platform, &message.room_key, || CreateSessionParams {
            agent_id: message.source_platform.clone(),
            user_id: Some(internal_id.clone()),
            room_id: message.room_key.clone(),
            kind: SessionKind::Conversation,
            timeout_ms: state.config.session.default_timeout_ms,
            renewal_policy: RenewalPolicy::OnActivity,
            metadata: Metadata::new(),
        })
        .await?;

    let Some(text) = message.text.as_deref() else { return Ok(()) };

    let classification = raidcore_agent::classify(text);
    if classification.category == Category::RaidControl {
        return route_raid_control(state, &session, text).await;
    }

    dispatch_text(state, &session, text, classification).await
}

/// Raid-control messages are handed to the Raid Coordinator and never reach
/// the model engine (spec §4.4 Stage 2 routing).
async fn route_raid_control(state: &AppState, session: &Session, text: &str) -> Result<(), ServerError> {
    state.sessions.update_activity(session.id, 1).await?;
    if let Some(raid) = session.raid.as_ref() {
        let topic = raidcore_core::Topic::raid(&raid.raid_id);
        state.bus.publish(
            &topic.to_string(),
            raidcore_core::BusEvent::new("raid.control_message", topic, serde_json::json!({ "text": text })),
        );
    }
    Ok(())
}

async fn dispatch_text(state: &AppState, session: &Session, text: &str, classification: Classification) -> Result<(), ServerError> {
    state.sessions.update_activity(session.id, 1).await?;
    let recent = state.memory.get_recent(&session.room_id, 20, None).await?;
    let request = raidcore_agent::compose(session, text, &classification, &recent, &[], None, &state.personality);
    state.dispatcher.dispatch(session.id, &session.agent_id, &session.room_id, request).await?;
    Ok(())
}

// -- health / metrics ---------------------------------------------------

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    pools: serde_json::Value,
    loops: serde_json::Value,
    subscribers: usize,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (simple_degraded, complex_degraded) = state.router_pool_health();
    let status = if simple_degraded || complex_degraded { "degraded" } else { "ok" };

    Json(HealthResponse {
        status,
        pools: serde_json::json!({ "simple_degraded": simple_degraded, "complex_degraded": complex_degraded }),
        loops: serde_json::json!({ "session_sweep": "running", "raid_monitor": "running", "pool_health": "running" }),
        subscribers: state.bus.subscriber_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_kind_from_raid_literal() {
        assert_eq!(session_kind_from(Some("raid")), SessionKind::Raid);
    }

    #[test]
    fn session_kind_defaults_to_conversation() {
        assert_eq!(session_kind_from(None), SessionKind::Conversation);
        assert_eq!(session_kind_from(Some("anything-else")), SessionKind::Conversation);
    }

    #[test]
    fn parse_uuid_rejects_garbage() {
        assert!(parse_uuid("not-a-uuid").is_err());
    }

    #[test]
    fn parse_uuid_accepts_a_valid_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_uuid(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn default_reason_is_manual_completion() {
        assert_eq!(default_reason(), "manual completion");
    }
}
