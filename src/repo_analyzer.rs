//! Repository Compatibility Analyzer — spec §4.E.
//!
//! Derives, per pool, the packages safely syncable across every endpoint
//! currently assigned to it ("common"), the packages that must be
//! excluded (missing, version-conflicting, or policy-excluded), and the
//! set of detected version conflicts.

use crate::db::Db;
use crate::error::AppError;
use crate::id::Id;
use crate::model::SyncPolicy;
use crate::repositories;
use crate::vercmp;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommonPackage {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExcludedPackage {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct PackageConflict {
    pub name: String,
    pub endpoint_versions: BTreeMap<String, String>,
    pub suggested_resolution: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompatibilityAnalysis {
    pub pool_id: Id,
    pub common_packages: Vec<CommonPackage>,
    pub excluded_packages: Vec<ExcludedPackage>,
    pub conflicts: Vec<PackageConflict>,
    pub last_analyzed: DateTime<Utc>,
}

static CACHE: Lazy<DashMap<Id, CompatibilityAnalysis>> = Lazy::new(DashMap::new);

async fn endpoint_ids_in_pool(db: &Db, pool_id: Id) -> Result<HashSet<Id>, AppError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM endpoints WHERE pool_id = ?")
        .bind(pool_id.to_string())
        .fetch_all(db.pool())
        .await?;
    rows.into_iter()
        .map(|(id,)| id.parse().map_err(|e: crate::id::ParseIdError| AppError::Internal(e.to_string())))
        .collect()
}

/// Recomputes the analysis for `pool_id` from each member endpoint's
/// current repository index, and refreshes the cache entry.
pub async fn analyze(db: &Db, pool_id: Id, policy: &SyncPolicy) -> Result<CompatibilityAnalysis, AppError> {
    let members = endpoint_ids_in_pool(db, pool_id).await?;
    let repos = repositories::list_for_pool(db, pool_id).await?;

    // name -> endpoint_id -> (version, repository, architecture)
    let mut availability: BTreeMap<String, BTreeMap<Id, (String, String, String)>> = BTreeMap::new();
    for repo in &repos {
        for pkg in &repo.packages {
            availability
                .entry(pkg.name.clone())
                .or_default()
                .insert(repo.endpoint_id, (pkg.version.clone(), pkg.repository.clone(), pkg.architecture.clone()));
        }
    }

    let mut common = Vec::new();
    let mut excluded = Vec::new();
    let mut conflicts = Vec::new();

    for (name, by_endpoint) in availability {
        if policy.exclude_packages.contains(&name) {
            excluded.push(ExcludedPackage {
                name,
                reason: "policy".to_string(),
            });
            continue;
        }

        let seen: HashSet<Id> = by_endpoint.keys().copied().collect();
        let on_every_member = !members.is_empty() && seen == members;

        if on_every_member {
            let versions: BTreeSet<&str> = by_endpoint.values().map(|(v, _, _)| v.as_str()).collect();
            if versions.len() == 1 {
                common.push(CommonPackage {
                    name,
                    version: versions.into_iter().next().unwrap().to_string(),
                });
            } else {
                let suggested = versions
                    .iter()
                    .copied()
                    .max()
                    .map(str::to_string)
                    .unwrap_or_default();
                let endpoint_versions = by_endpoint
                    .iter()
                    .map(|(id, (v, _, _))| (id.to_string(), v.clone()))
                    .collect();
                conflicts.push(PackageConflict {
                    name: name.clone(),
                    endpoint_versions,
                    suggested_resolution: suggested,
                });
                excluded.push(ExcludedPackage {
                    name,
                    reason: "version_conflict".to_string(),
                });
            }
        } else {
            let missing_from = members.len().saturating_sub(seen.len());
            excluded.push(ExcludedPackage {
                name,
                reason: format!("missing_from_{missing_from}_endpoints"),
            });
        }
    }

    common.sort();
    excluded.sort();
    conflicts.sort_by(|a, b| a.name.cmp(&b.name));

    let analysis = CompatibilityAnalysis {
        pool_id,
        common_packages: common,
        excluded_packages: excluded,
        conflicts,
        last_analyzed: Utc::now(),
    };
    CACHE.insert(pool_id, analysis.clone());
    Ok(analysis)
}

/// Invoked automatically whenever an endpoint's repositories are
/// replaced, iff that endpoint is currently in a pool. Failures are
/// logged, not propagated — a stale analysis cache is not worth failing
/// the repository push over.
pub async fn reanalyze_in_background(db: Db, pool_id: Id, policy: SyncPolicy) {
    if let Err(err) = analyze(&db, pool_id, &policy).await {
        tracing::warn!(?err, %pool_id, "repository re-analysis failed");
    }
}

pub fn cached(pool_id: Id) -> Option<CompatibilityAnalysis> {
    CACHE.get(&pool_id).map(|e| e.clone())
}

/// Number of pools with a cached analysis — surfaced on `/health/detailed`.
pub fn cached_count() -> usize {
    CACHE.len()
}

/// The tie-break pinned by spec §9: among conflicting versions, the
/// lexicographically greatest string wins, not the pacman-newest one.
/// Exposed so callers that want vercmp-based resolution (the Sync
/// Coordinator's `newest`/`oldest` policies) can tell the two apart.
pub fn vercmp_newest(versions: &[&str]) -> Option<String> {
    versions
        .iter()
        .copied()
        .reduce(vercmp::newer)
        .map(str::to_string)
}

pub mod handlers {
    use super::*;
    use crate::error::AppResult;
    use crate::extractor::Principal;
    use axum::extract::{Extension, Json, Path};

    /// GET /api/repositories/analysis/{pool_id} — any authenticated caller.
    pub async fn analysis(
        _principal: Principal,
        Extension(db): Extension<Db>,
        Path(pool_id): Path<Id>,
    ) -> AppResult<Json<CompatibilityAnalysis>> {
        let pool = crate::pool_manager::get_pool(&db, pool_id)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(Json(analyze(&db, pool_id, &pool.sync_policy).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Repository, RepositoryPackage};

    fn repo(endpoint_id: Id, packages: &[(&str, &str)]) -> Repository {
        Repository {
            id: Id::new(),
            endpoint_id,
            repo_name: "core".to_string(),
            primary_url: "https://example.invalid".to_string(),
            mirrors: vec![],
            packages: packages
                .iter()
                .map(|(name, version)| RepositoryPackage {
                    name: name.to_string(),
                    version: version.to_string(),
                    repository: "core".to_string(),
                    architecture: "x86_64".to_string(),
                    description: String::new(),
                })
                .collect(),
            last_updated: Utc::now(),
        }
    }

    // Exercises the same partitioning logic as `analyze` without needing a
    // database: builds the availability map from in-memory repositories.
    fn partition(
        members: &HashSet<Id>,
        repos: &[Repository],
        policy: &SyncPolicy,
    ) -> (Vec<CommonPackage>, Vec<ExcludedPackage>, Vec<PackageConflict>) {
        let mut availability: BTreeMap<String, BTreeMap<Id, String>> = BTreeMap::new();
        for repo in repos {
            for pkg in &repo.packages {
                availability
                    .entry(pkg.name.clone())
                    .or_default()
                    .insert(repo.endpoint_id, pkg.version.clone());
            }
        }
        let mut common = Vec::new();
        let mut excluded = Vec::new();
        let mut conflicts = Vec::new();
        for (name, by_endpoint) in availability {
            if policy.exclude_packages.contains(&name) {
                excluded.push(ExcludedPackage { name, reason: "policy".into() });
                continue;
            }
            let seen: HashSet<Id> = by_endpoint.keys().copied().collect();
            if &seen == members {
                let versions: BTreeSet<&str> = by_endpoint.values().map(String::as_str).collect();
                if versions.len() == 1 {
                    common.push(CommonPackage { name, version: versions.into_iter().next().unwrap().into() });
                } else {
                    let suggested = versions.iter().copied().max().unwrap().to_string();
                    excluded.push(ExcludedPackage { name: name.clone(), reason: "version_conflict".into() });
                    conflicts.push(PackageConflict {
                        name,
                        endpoint_versions: by_endpoint.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                        suggested_resolution: suggested,
                    });
                }
            } else {
                let missing_from = members.len().saturating_sub(seen.len());
                excluded.push(ExcludedPackage { name, reason: format!("missing_from_{missing_from}_endpoints") });
            }
        }
        (common, excluded, conflicts)
    }

    #[test]
    fn s5_analyzer_produces_correct_partitions() {
        let e1 = Id::new();
        let e2 = Id::new();
        let members: HashSet<Id> = [e1, e2].into_iter().collect();
        let repos = vec![
            repo(e1, &[("A", "1.0"), ("B", "1.0")]),
            repo(e2, &[("A", "1.1"), ("B", "1.0"), ("C", "3.0")]),
        ];
        let mut policy = SyncPolicy::default();
        policy.exclude_packages.insert("D".to_string());

        let (common, excluded, conflicts) = partition(&members, &repos, &policy);

        assert_eq!(common, vec![CommonPackage { name: "B".into(), version: "1.0".into() }]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].name, "A");
        assert_eq!(conflicts[0].suggested_resolution, "1.1");
        assert!(excluded.iter().any(|e| e.name == "A" && e.reason == "version_conflict"));
        assert!(excluded.iter().any(|e| e.name == "C" && e.reason == "missing_from_1_endpoints"));
    }

    #[test]
    fn analyzer_is_deterministic_for_equal_inputs() {
        let e1 = Id::new();
        let e2 = Id::new();
        let members: HashSet<Id> = [e1, e2].into_iter().collect();
        let repos = vec![repo(e1, &[("A", "1.0")]), repo(e2, &[("A", "1.0")])];
        let policy = SyncPolicy::default();

        let first = partition(&members, &repos, &policy);
        let second = partition(&members, &repos, &policy);
        assert_eq!(first, second);
    }
}
