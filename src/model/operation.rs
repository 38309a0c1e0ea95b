use crate::id::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SyncToLatest,
    SetAsLatest,
    RevertToPrevious,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::SyncToLatest => "sync_to_latest",
            OperationKind::SetAsLatest => "set_as_latest",
            OperationKind::RevertToPrevious => "revert_to_previous",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "in_progress" => OperationStatus::InProgress,
            "completed" => OperationStatus::Completed,
            "failed" => OperationStatus::Failed,
            "cancelled" => OperationStatus::Cancelled,
            _ => OperationStatus::Pending,
        }
    }

    /// Non-terminal statuses hold the single-flight reservation (O1).
    pub fn is_active(self) -> bool {
        matches!(self, OperationStatus::Pending | OperationStatus::InProgress)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: Id,
    pub pool_id: Id,
    pub endpoint_id: Id,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub details: Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
