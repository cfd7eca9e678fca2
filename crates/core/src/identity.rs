//! Identity resolution data model (spec §3, §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityBinding {
    pub internal_id: Uuid,
    pub platform: String,
    pub platform_id: String,
    pub verified: bool,
    pub linked_at: DateTime<Utc>,
}
