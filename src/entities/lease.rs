use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named mutual-exclusion record with a TTL. At most one unexpired lease
/// exists per name; an expired lease may be stolen by a new holder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub name: String,
    pub holder: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub lease_version: i64,
}

impl LeaseRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Lease name for a pool's mutation lock.
pub fn pool_lease_name(pool_id: Uuid) -> String {
    format!("pool:{pool_id}")
}
