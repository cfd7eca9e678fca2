//! Application state: every handler-visible collaborator wired once at
//! startup into one `Arc`-friendly struct, threaded through `axum::State`
//! rather than looked up from a global (spec §9 "explicit application
//! object, no service locator").

use std::sync::Arc;

use raidcore_agent::{Dispatcher, EventBus, PersonalityConfig, RaidCoordinator};
use raidcore_agent::SessionManager;
use raidcore_config::Settings;
use raidcore_ingress::{Stage1Pipeline, WebhookAdapter};
use raidcore_memory::MemoryStore;
use raidcore_persistence::{IdentityResolver, RaidActionLog, Router};

#[derive(Clone)]
pub struct AppState {
    pub config: Settings,
    pub router: Arc<Router>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    pub sessions: Arc<SessionManager>,
    pub raids: Arc<RaidCoordinator>,
    pub bus: Arc<EventBus>,
    pub dispatcher: Arc<Dispatcher>,
    pub memory: Arc<MemoryStore>,
    pub identities: Arc<IdentityResolver>,
    pub raid_actions: Arc<RaidActionLog>,
    pub ingress: Arc<Stage1Pipeline>,
    pub webhook_adapters: Arc<Vec<(String, WebhookAdapter)>>,
    pub personality: Arc<PersonalityConfig>,
}

impl AppState {
    pub fn webhook_adapter(&self, platform: &str) -> Option<&WebhookAdapter> {
        self.webhook_adapters.iter().find(|(name, _)| name == platform).map(|(_, adapter)| adapter)
    }

    pub fn router_pool_health(&self) -> (bool, bool) {
        self.router.pool_health()
    }
}
