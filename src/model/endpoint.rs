use crate::id::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InSync,
    Ahead,
    Behind,
    Offline,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::InSync => "in_sync",
            SyncStatus::Ahead => "ahead",
            SyncStatus::Behind => "behind",
            SyncStatus::Offline => "offline",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "ahead" => SyncStatus::Ahead,
            "behind" => SyncStatus::Behind,
            "offline" => SyncStatus::Offline,
            _ => SyncStatus::InSync,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Id,
    pub name: String,
    pub hostname: String,
    pub pool_id: Option<Id>,
    pub last_seen: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
