use crate::id::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub repository: String,
    pub installed_size: i64,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// An immutable record of one endpoint's installed package set at one
/// instant. Never mutated after insert (invariant S1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Id,
    pub pool_id: Id,
    pub endpoint_id: Id,
    pub captured_at: DateTime<Utc>,
    pub pacman_version: String,
    pub architecture: String,
    pub packages: Vec<PackageRecord>,
}

impl Snapshot {
    pub fn package(&self, name: &str) -> Option<&PackageRecord> {
        self.packages.iter().find(|p| p.name == name)
    }
}

/// What an endpoint reports to become a new [`Snapshot`].
#[derive(Debug, Clone, Deserialize)]
pub struct SystemStateReport {
    pub pacman_version: String,
    pub architecture: String,
    pub packages: Vec<PackageRecord>,
}
