//! Process entry point: config/tracing/persistence bring-up, `AppState`
//! wiring, background loop spawning, and graceful shutdown (spec §6).
//!
//! Exit codes: `0` clean shutdown, `1` fatal init failure, `2` unrecoverable
//! runtime panic, `3` shutdown-grace exceeded.

use std::net::SocketAddr;
use std::sync::Arc;

use raidcore_agent::{
    Dispatcher, EventBus, PersonalityConfig, PollingVerificationAdapter, RaidCoordinator, RaidCoordinatorConfig,
    SessionManager, SessionManagerConfig,
};
use raidcore_config::{load_settings, Settings};
use raidcore_ingress::{PipelineConfig, Stage1Pipeline, WebhookAdapter};
use raidcore_memory::{MemoryStore, VectorStore, VectorStoreConfig};
use raidcore_model_engine::{HttpEmbeddingClient, HttpEmbeddingClientConfig, HttpModelEngine, HttpModelEngineConfig};
use raidcore_persistence::{RouterConfig, ScyllaConfig};
use raidcore_server::create_router;
use raidcore_server::metrics::init_metrics;
use raidcore_server::state::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() {
    let env = std::env::var("RAIDCORE_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            let err = raidcore_core::CoreError::from(e);
            eprintln!("fatal[{}]: {err}", err.code());
            std::process::exit(1);
        }
    };

    init_tracing(&config);
    tracing::info!(environment = ?config.environment, "starting raidcore-server");

    let state = match build_state(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "fatal: could not initialize application state");
            std::process::exit(1);
        }
    };

    let cancel = tokio_util::sync::CancellationToken::new();
    state.sessions.clone().spawn_sweep(cancel.clone());
    state.raids.clone().spawn_monitor(cancel.clone());
    state.router.clone().spawn_health_loop(cancel.clone());

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!(%addr, "listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "fatal: could not bind listener");
            std::process::exit(1);
        }
    };

    let shutdown_grace = std::time::Duration::from_millis(config.server.shutdown_grace_ms);
    let shutdown_signal_cancel = cancel.clone();
    let mut serve_handle = tokio::spawn(
        axum::serve(listener, app).with_graceful_shutdown(async move { wait_for_signal(shutdown_signal_cancel).await }),
    );

    tokio::select! {
        result = &mut serve_handle => exit_for(result),
        _ = cancel.cancelled() => {
            match tokio::time::timeout(shutdown_grace, serve_handle).await {
                Ok(result) => exit_for(result),
                Err(_) => {
                    tracing::error!("shutdown grace period exceeded");
                    std::process::exit(3);
                }
            }
        }
    }
}

fn exit_for(result: Result<std::io::Result<()>, tokio::task::JoinError>) -> ! {
    match result {
        Ok(Ok(())) => {
            tracing::info!("server shutdown complete");
            std::process::exit(0);
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "server exited with error");
            std::process::exit(2);
        }
        Err(e) => {
            tracing::error!(error = %e, "server task panicked");
            std::process::exit(2);
        }
    }
}

/// Resolves on Ctrl+C/SIGTERM and fires `cancel` for the background loops;
/// axum starts its own graceful drain once this future resolves.
async fn wait_for_signal(cancel: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, initiating graceful shutdown"),
    }
    cancel.cancel();
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("raidcore={},tower_http=info", config.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}

#[derive(Debug, thiserror::Error)]
enum InitError {
    #[error("persistence: {0}")]
    Persistence(#[from] raidcore_persistence::PersistenceError),
    #[error("memory: {0}")]
    Memory(#[from] raidcore_memory::MemoryError),
    #[error("model engine: {0}")]
    ModelEngine(#[from] raidcore_model_engine::ModelEngineError),
}

async fn build_state(config: Settings) -> Result<AppState, InitError> {
    let scylla_config = ScyllaConfig {
        hosts: config.persistence.scylla_hosts.clone(),
        keyspace: config.persistence.keyspace.clone(),
        replication_factor: config.persistence.replication_factor,
    };
    let router_config = RouterConfig {
        pool_tx_size: config.persistence.pool_tx_size,
        pool_sess_size: config.persistence.pool_sess_size,
        wait_queue_depth: config.persistence.wait_queue_depth,
        simple_timeout: std::time::Duration::from_millis(config.persistence.simple_timeout_ms),
        complex_timeout: std::time::Duration::from_millis(config.persistence.complex_timeout_ms),
        health_interval: std::time::Duration::from_millis(config.persistence.health_interval_ms),
        max_retries: 2,
    };
    let persistence = raidcore_persistence::init(scylla_config, router_config).await?;
    let router = persistence.router;
    let sessions_table = Arc::new(persistence.sessions);
    let identities = Arc::new(persistence.identities);
    let raid_actions = Arc::new(persistence.raid_actions);

    let vector_store = Arc::new(
        VectorStore::connect(VectorStoreConfig {
            endpoint: config.memory.qdrant_endpoint.clone(),
            collection: config.memory.qdrant_collection.clone(),
            vector_dim: config.memory.embedding_dim,
            api_key: config.memory.qdrant_api_key.clone(),
        })
        .await?,
    );
    vector_store.ensure_collection().await?;

    let embedder: Arc<dyn raidcore_core::EmbeddingClient> = Arc::new(HttpEmbeddingClient::new(HttpEmbeddingClientConfig {
        endpoint: config.memory.embedding_endpoint.clone(),
        api_key: config.memory.embedding_api_key.clone(),
        model: config.memory.embedding_model.clone(),
        dimension: config.memory.embedding_dim,
        request_timeout_ms: config.memory.embedding_timeout_ms,
    })?);

    let allow_list = raidcore_core::EmbedOnWriteAllowList::new(config.memory.embed_on_write_kinds.clone());
    let memory = Arc::new(MemoryStore::new(router.clone(), vector_store, embedder, allow_list));

    let model_engine: Arc<dyn raidcore_core::ModelEngine> = Arc::new(HttpModelEngine::new(HttpModelEngineConfig {
        endpoint: config.model_engine.endpoint.clone(),
        api_key: config.model_engine.api_key.clone(),
        model: config.model_engine.model.clone(),
        request_timeout_ms: config.model_engine.request_timeout_ms,
    })?);

    let bus = Arc::new(EventBus::new());
    let dispatcher = Arc::new(Dispatcher::new(
        model_engine,
        memory.clone(),
        bus.clone(),
        raidcore_model_engine::HumanizationConfig::default(),
    ));

    let session_manager = Arc::new(SessionManager::new(
        sessions_table.clone(),
        bus.clone(),
        SessionManagerConfig {
            sweep_interval_ms: config.session.sweep_interval_ms,
            retention_ms: config.session.retention_ms,
        },
    ));

    let verifier: Arc<dyn raidcore_core::VerificationAdapter> = Arc::new(PollingVerificationAdapter::default());
    let raid_coordinator = Arc::new(RaidCoordinator::new(
        sessions_table,
        raid_actions.clone(),
        bus.clone(),
        verifier,
        RaidCoordinatorConfig {
            poll_interval_ms: config.raid.poll_interval_ms,
            verify_latency_min_ms: config.raid.verify_latency_min_ms as i64,
            verify_concurrency: config.raid.verify_concurrency,
            auto_start_on_join: config.raid.auto_start_on_join,
        },
    ));

    let webhook_signing_secret = std::env::var("WEBHOOK_SIGNING_SECRET").unwrap_or_else(|_| "development-only-secret".to_string());
    let webhook_adapters = Arc::new(vec![(
        "generic".to_string(),
        WebhookAdapter::new("generic", webhook_signing_secret.into_bytes()),
    )]);

    let ingress = Arc::new(Stage1Pipeline::new(PipelineConfig {
        rate_limit_capacity: config.ingress.rate_limit_per_min,
        rate_limit_window: std::time::Duration::from_secs(config.ingress.rate_limit_window_secs),
        dedup_ttl: std::time::Duration::from_millis(config.ingress.dedup_ttl_ms),
        dedup_capacity: config.ingress.dedup_capacity,
        blocklist_elevation_threshold: config.ingress.blocklist_threshold as usize,
        blocklist_elevation_window: std::time::Duration::from_secs(3600),
    }));

    Ok(AppState {
        config,
        router,
        metrics_handle: init_metrics(),
        sessions: session_manager,
        raids: raid_coordinator,
        bus,
        dispatcher,
        memory,
        identities,
        raid_actions,
        ingress,
        webhook_adapters,
        personality: Arc::new(PersonalityConfig::default()),
    })
}
