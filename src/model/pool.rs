use super::policy::SyncPolicy;
use crate::id::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub target_snapshot_id: Option<Id>,
    pub sync_policy: SyncPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Denormalised read of the endpoints currently assigned to this pool.
    /// The authoritative relation is always `Endpoint.pool_id`.
    #[serde(default)]
    pub endpoint_ids: Vec<Id>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PoolOverallStatus {
    Empty,
    FullySynced,
    AllOffline,
    PartiallySynced,
    OutOfSync,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub pool_id: Id,
    pub total_endpoints: u64,
    pub in_sync_count: u64,
    pub ahead_count: u64,
    pub behind_count: u64,
    pub offline_count: u64,
    pub sync_percentage: f64,
    pub overall_status: PoolOverallStatus,
}
