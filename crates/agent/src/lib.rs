//! Session Manager (spec §4.5), Raid Coordinator (spec §4.6), Ingress
//! Stage 2 classification (spec §4.4), Prompt Composer (spec §4.8), and the
//! process-local Event Bus (spec §4.7).

pub mod bus;
pub mod classification;
pub mod composer;
pub mod dispatcher;
pub mod raid;
pub mod session_manager;
pub mod verification_stub;

pub use bus::{EventBus, SubscriptionId};
pub use classification::classify;
pub use composer::{compose, PersonalityConfig};
pub use dispatcher::Dispatcher;
pub use raid::{CreateRaidParams, JoinIdentity, RaidCoordinator, RaidCoordinatorConfig, RaidMetrics, SubmittedAction};
pub use session_manager::{SessionManager, SessionManagerConfig};
pub use verification_stub::PollingVerificationAdapter;
