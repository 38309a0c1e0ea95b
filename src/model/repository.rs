use crate::id::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPackage {
    pub name: String,
    pub version: String,
    pub repository: String,
    pub architecture: String,
    #[serde(default)]
    pub description: String,
}

/// One repository as seen from one endpoint. Bulk-replaced per endpoint on
/// each push — invariant R1: `(endpoint_id, repo_name)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: Id,
    pub endpoint_id: Id,
    pub repo_name: String,
    pub primary_url: String,
    #[serde(default)]
    pub mirrors: Vec<String>,
    pub packages: Vec<RepositoryPackage>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryInput {
    pub repo_name: String,
    pub primary_url: String,
    #[serde(default)]
    pub mirrors: Vec<String>,
    pub packages: Vec<RepositoryPackage>,
}
