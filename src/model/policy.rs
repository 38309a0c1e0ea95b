use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    Manual,
    Newest,
    Oldest,
}

impl Default for ConflictResolution {
    fn default() -> Self {
        ConflictResolution::Manual
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    #[serde(default)]
    pub auto_sync: bool,
    #[serde(default)]
    pub exclude_packages: BTreeSet<String>,
    #[serde(default)]
    pub include_aur: bool,
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy {
            auto_sync: false,
            exclude_packages: BTreeSet::new(),
            include_aur: false,
            conflict_resolution: ConflictResolution::Manual,
        }
    }
}
