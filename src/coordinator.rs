//! Sync Coordinator — spec §4.F. Owns the single-flight reservation per
//! endpoint, drives each Operation through its pipeline, and publishes
//! progress over [`crate::ws`].

use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::id::Id;
use crate::model::{
    ConflictResolution, Operation, OperationKind, OperationStatus, PackageRecord, Snapshot,
    SyncStatus,
};
use crate::mutator::{MutationIntent, Mutator};
use crate::state_manager::StateManager;
use crate::vercmp;
use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::json;
use sqlx::Row;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// `endpoint_id -> operation_id` currently holding the single-flight slot
/// (O1: at most one active operation per endpoint). In-memory only —
/// reconciled against the database on startup by [`recover_on_startup`].
static INFLIGHT: Lazy<DashMap<Id, Id>> = Lazy::new(DashMap::new);

/// Flipped once when the process starts graceful shutdown. New
/// operation-creating calls check this and bail out with `ShuttingDown`
/// (spec §5) instead of starting work that the drain timeout would only
/// have to cut short.
static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

/// Called once from `main`'s shutdown signal handler.
pub fn begin_shutdown() {
    SHUTTING_DOWN.store(true, Ordering::SeqCst);
}

fn reject_if_shutting_down() -> AppResult<()> {
    if SHUTTING_DOWN.load(Ordering::SeqCst) {
        return Err(AppError::ShuttingDown);
    }
    Ok(())
}

#[derive(Clone)]
pub struct Coordinator {
    db: Db,
    state: StateManager,
    mutator: Arc<dyn Mutator>,
}

fn row_to_operation(row: &sqlx::any::AnyRow) -> AppResult<Operation> {
    let id: String = row.try_get("id")?;
    let pool_id: String = row.try_get("pool_id")?;
    let endpoint_id: String = row.try_get("endpoint_id")?;
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let details_json: String = row.try_get("details")?;
    let created_at: String = row.try_get("created_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;
    let details = serde_json::from_str(&details_json)
        .map_err(|e| AppError::Internal(format!("corrupt operation details: {e}")))?;
    Ok(Operation {
        id: Id::from_str(&id).map_err(|e| AppError::Internal(e.to_string()))?,
        pool_id: Id::from_str(&pool_id).map_err(|e| AppError::Internal(e.to_string()))?,
        endpoint_id: Id::from_str(&endpoint_id).map_err(|e| AppError::Internal(e.to_string()))?,
        kind: parse_kind(&kind),
        status: OperationStatus::parse(&status),
        details,
        error_message: row.try_get("error_message")?,
        created_at: created_at
            .parse()
            .map_err(|_| AppError::Internal("corrupt operation timestamp".into()))?,
        completed_at: completed_at
            .map(|s| s.parse())
            .transpose()
            .map_err(|_| AppError::Internal("corrupt operation timestamp".into()))?,
    })
}

fn parse_kind(raw: &str) -> OperationKind {
    match raw {
        "set_as_latest" => OperationKind::SetAsLatest,
        "revert_to_previous" => OperationKind::RevertToPrevious,
        _ => OperationKind::SyncToLatest,
    }
}

/// What a [`Conflict`] resolves to once the mutator is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConflictAction {
    Install,
    Upgrade,
    Remove,
}

/// A detected difference between an endpoint's current snapshot and the
/// snapshot it is converging toward.
#[derive(Debug, Clone)]
struct Conflict {
    package: String,
    current_version: Option<String>,
    target_version: Option<String>,
    action: ConflictAction,
}

/// Conflict analysis per spec §4.F: for every name in target not matching
/// current (or absent from it) → install/upgrade; for every name present
/// in current but absent from target → remove.
fn diff_packages(current: &[PackageRecord], target: &[PackageRecord]) -> Vec<Conflict> {
    let current_by_name: BTreeMap<&str, &str> = current
        .iter()
        .map(|p| (p.name.as_str(), p.version.as_str()))
        .collect();
    let target_by_name: BTreeMap<&str, &str> = target
        .iter()
        .map(|p| (p.name.as_str(), p.version.as_str()))
        .collect();
    let mut conflicts = Vec::new();
    for pkg in target {
        match current_by_name.get(pkg.name.as_str()) {
            Some(&version) if version == pkg.version => {}
            Some(&version) => conflicts.push(Conflict {
                package: pkg.name.clone(),
                current_version: Some(version.to_string()),
                target_version: Some(pkg.version.clone()),
                action: ConflictAction::Upgrade,
            }),
            None => conflicts.push(Conflict {
                package: pkg.name.clone(),
                current_version: None,
                target_version: Some(pkg.version.clone()),
                action: ConflictAction::Install,
            }),
        }
    }
    for pkg in current {
        if !target_by_name.contains_key(pkg.name.as_str()) {
            conflicts.push(Conflict {
                package: pkg.name.clone(),
                current_version: Some(pkg.version.clone()),
                target_version: None,
                action: ConflictAction::Remove,
            });
        }
    }
    conflicts
}

/// Applies a pool's auto-resolution policy to a raw diff. `Manual`
/// resolution leaves every conflict unresolved — the caller decides
/// whether that blocks the operation (spec §4.F, S3). Install/remove
/// conflicts have only one side of the version to compare, so both are
/// accepted outright under `newest`/`oldest`; only a genuine
/// version_mismatch needs the vercmp tie-break.
fn auto_resolve(conflicts: &[Conflict], resolution: ConflictResolution) -> (Vec<Conflict>, Vec<Conflict>) {
    match resolution {
        ConflictResolution::Manual => (Vec::new(), conflicts.to_vec()),
        ConflictResolution::Newest | ConflictResolution::Oldest => {
            let mut resolved = Vec::new();
            let mut unresolved = Vec::new();
            for conflict in conflicts {
                let (Some(current), Some(target)) = (&conflict.current_version, &conflict.target_version) else {
                    resolved.push(conflict.clone());
                    continue;
                };
                let picked = if resolution == ConflictResolution::Newest {
                    vercmp::newer(current, target)
                } else {
                    vercmp::older(current, target)
                };
                if picked == target.as_str() {
                    resolved.push(conflict.clone());
                } else {
                    unresolved.push(conflict.clone());
                }
            }
            (resolved, unresolved)
        }
    }
}

/// Translates a pipeline's resolved conflicts into the intent handed to
/// the mutator, bucketed by action.
fn build_intent(endpoint_id: Id, resolved: &[Conflict]) -> MutationIntent {
    MutationIntent {
        endpoint_id,
        install: resolved
            .iter()
            .filter(|c| c.action == ConflictAction::Install)
            .map(|c| c.package.clone())
            .collect(),
        remove: resolved
            .iter()
            .filter(|c| c.action == ConflictAction::Remove)
            .map(|c| c.package.clone())
            .collect(),
        upgrade: resolved
            .iter()
            .filter(|c| c.action == ConflictAction::Upgrade)
            .map(|c| (c.package.clone(), c.target_version.clone().unwrap_or_default()))
            .collect(),
    }
}

impl Coordinator {
    pub fn new(db: Db, state: StateManager, mutator: Arc<dyn Mutator>) -> Self {
        Coordinator { db, state, mutator }
    }

    fn try_reserve(&self, endpoint_id: Id, operation_id: Id) -> AppResult<()> {
        match INFLIGHT.entry(endpoint_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(AppError::Conflict(
                "an operation is already in progress for this endpoint".into(),
            )),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(operation_id);
                Ok(())
            }
        }
    }

    fn release(&self, endpoint_id: Id) {
        INFLIGHT.remove(&endpoint_id);
    }

    /// Number of endpoints currently holding a single-flight reservation —
    /// surfaced on `/health/detailed`.
    pub fn inflight_count(&self) -> usize {
        INFLIGHT.len()
    }

    /// Inserts the Operation row for an `id` the caller has already
    /// reserved a single-flight slot for (see `try_reserve`).
    async fn insert_operation(
        &self,
        id: Id,
        pool_id: Id,
        endpoint_id: Id,
        kind: OperationKind,
        details: serde_json::Value,
    ) -> AppResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO operations
                (id, pool_id, endpoint_id, kind, status, details, error_message, created_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, NULL, ?, NULL)",
        )
        .bind(id.to_string())
        .bind(pool_id.to_string())
        .bind(endpoint_id.to_string())
        .bind(kind.as_str())
        .bind(OperationStatus::Pending.as_str())
        .bind(details.to_string())
        .bind(now.to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn transition(
        &self,
        operation_id: Id,
        status: OperationStatus,
        error_message: Option<&str>,
    ) -> AppResult<()> {
        let completed_at = status.is_terminal().then(|| Utc::now().to_rfc3339());
        sqlx::query(
            "UPDATE operations SET status = ?, error_message = ?, completed_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(completed_at)
        .bind(operation_id.to_string())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn endpoint_pool(&self, endpoint_id: Id) -> AppResult<Id> {
        let pool_id: Option<String> = sqlx::query_scalar("SELECT pool_id FROM endpoints WHERE id = ?")
            .bind(endpoint_id.to_string())
            .fetch_optional(self.db.pool())
            .await?
            .flatten();
        pool_id
            .ok_or_else(|| AppError::Validation("endpoint is not assigned to a pool".into()))
            .and_then(|s| Id::from_str(&s).map_err(|e| AppError::Internal(e.to_string())))
    }

    async fn set_sync_status(&self, endpoint_id: Id, status: SyncStatus) -> AppResult<()> {
        sqlx::query("UPDATE endpoints SET sync_status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(endpoint_id.to_string())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Converges `endpoint_id` onto its pool's current target snapshot.
    /// Rejects with `Validation` if the pool has no target, with
    /// `Conflict` if the endpoint already holds the single-flight slot.
    pub async fn sync_to_latest(&self, endpoint_id: Id) -> AppResult<Id> {
        reject_if_shutting_down()?;
        let pool_id = self.endpoint_pool(endpoint_id).await?;
        let target = self
            .state
            .get_target_snapshot(pool_id)
            .await?
            .ok_or_else(|| AppError::Validation("pool has no target snapshot".into()))?;
        let current = self.state.get_endpoint_snapshots(endpoint_id, 1).await?;
        let current_packages = current.first().map(|s| s.packages.clone()).unwrap_or_default();

        let operation_id = Id::new();
        self.try_reserve(endpoint_id, operation_id)?;
        if let Err(err) = self
            .insert_operation(
                operation_id,
                pool_id,
                endpoint_id,
                OperationKind::SyncToLatest,
                json!({ "target_snapshot_id": target.id }),
            )
            .await
        {
            self.release(endpoint_id);
            return Err(err);
        }

        let mutator = self.mutator.clone();
        let this = self.clone();
        tokio::spawn(async move {
            this.run_pipeline(operation_id, endpoint_id, pool_id, current_packages, target, mutator)
                .await;
        });

        Ok(operation_id)
    }

    /// Captures the endpoint's current package set and promotes it to be
    /// the pool's new target — the endpoint that calls this is, by
    /// definition, already in sync with its own result.
    pub async fn set_as_latest(&self, endpoint_id: Id) -> AppResult<Id> {
        reject_if_shutting_down()?;
        let pool_id = self.endpoint_pool(endpoint_id).await?;
        let snapshots = self.state.get_endpoint_snapshots(endpoint_id, 1).await?;
        let latest = snapshots
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Validation("endpoint has no recorded snapshot".into()))?;

        let operation_id = Id::new();
        self.try_reserve(endpoint_id, operation_id)?;
        if let Err(err) = self
            .insert_operation(
                operation_id,
                pool_id,
                endpoint_id,
                OperationKind::SetAsLatest,
                json!({ "snapshot_id": latest.id }),
            )
            .await
        {
            self.release(endpoint_id);
            return Err(err);
        }

        // Sets every non-offline member (including this endpoint) to
        // `behind`, then the explicit in_sync below corrects this
        // endpoint's own status — it is, by definition, already in sync
        // with the snapshot it just contributed.
        crate::pool_manager::set_target_state(&self.db, &self.state, pool_id, latest.id).await?;
        self.transition(operation_id, OperationStatus::Completed, None).await?;
        self.release(endpoint_id);
        self.set_sync_status(endpoint_id, SyncStatus::InSync).await?;
        crate::ws::publish(
            endpoint_id,
            crate::ws::OperationUpdate::new(operation_id, OperationStatus::Completed, "done", 100, "promoted current state to pool target"),
        );
        Ok(operation_id)
    }

    /// Converges onto the endpoint's own second-most-recent snapshot.
    /// Fails with `Validation` if fewer than two snapshots exist for it.
    pub async fn revert_to_previous(&self, endpoint_id: Id) -> AppResult<Id> {
        reject_if_shutting_down()?;
        let pool_id = self.endpoint_pool(endpoint_id).await?;
        let previous = self
            .state
            .get_previous_snapshot(endpoint_id)
            .await?
            .ok_or_else(|| AppError::Validation("no previous snapshot to revert to".into()))?;
        let current = self.state.get_endpoint_snapshots(endpoint_id, 1).await?;
        let current_packages = current.first().map(|s| s.packages.clone()).unwrap_or_default();

        let operation_id = Id::new();
        self.try_reserve(endpoint_id, operation_id)?;
        if let Err(err) = self
            .insert_operation(
                operation_id,
                pool_id,
                endpoint_id,
                OperationKind::RevertToPrevious,
                json!({ "target_snapshot_id": previous.id }),
            )
            .await
        {
            self.release(endpoint_id);
            return Err(err);
        }

        let mutator = self.mutator.clone();
        let this = self.clone();
        tokio::spawn(async move {
            this.run_pipeline(operation_id, endpoint_id, pool_id, current_packages, previous, mutator)
                .await;
        });

        Ok(operation_id)
    }

    /// The async pipeline shared by `sync_to_latest` and
    /// `revert_to_previous`: diff against the target snapshot, apply the
    /// pool's conflict-resolution policy, hand resolved changes to the
    /// mutator, and finish as `Completed` or `Failed`.
    async fn run_pipeline(
        &self,
        operation_id: Id,
        endpoint_id: Id,
        pool_id: Id,
        current_packages: Vec<PackageRecord>,
        target: Snapshot,
        mutator: Arc<dyn Mutator>,
    ) {
        if let Err(err) = self
            .run_pipeline_inner(operation_id, endpoint_id, pool_id, current_packages, &target, mutator)
            .await
        {
            tracing::warn!(%operation_id, %endpoint_id, ?err, "sync pipeline failed");
            let _ = self
                .transition(operation_id, OperationStatus::Failed, Some(&err.to_string()))
                .await;
            crate::ws::publish(
                endpoint_id,
                crate::ws::OperationUpdate::new(operation_id, OperationStatus::Failed, "failed", 100, &err.to_string()),
            );
        }
        self.release(endpoint_id);
    }

    async fn run_pipeline_inner(
        &self,
        operation_id: Id,
        endpoint_id: Id,
        pool_id: Id,
        current_packages: Vec<PackageRecord>,
        target: &Snapshot,
        mutator: Arc<dyn Mutator>,
    ) -> AppResult<()> {
        self.transition(operation_id, OperationStatus::InProgress, None).await?;
        crate::ws::publish(
            endpoint_id,
            crate::ws::OperationUpdate::new(operation_id, OperationStatus::InProgress, "diffing", 10, "computing package diff"),
        );

        let pool_row: Option<(String,)> = sqlx::query_as("SELECT sync_policy FROM pools WHERE id = ?")
            .bind(pool_id.to_string())
            .fetch_optional(self.db.pool())
            .await?;
        let policy: crate::model::SyncPolicy = pool_row
            .map(|(json,)| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| AppError::Internal(e.to_string()))?
            .unwrap_or_default();

        let conflicts = diff_packages(&current_packages, &target.packages);
        let (resolved, unresolved) = auto_resolve(&conflicts, policy.conflict_resolution);

        if !unresolved.is_empty() {
            return Err(AppError::Conflict(format!(
                "{} package(s) require manual resolution: {}",
                unresolved.len(),
                unresolved
                    .iter()
                    .map(|c| c.package.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        crate::ws::publish(
            endpoint_id,
            crate::ws::OperationUpdate::new(operation_id, OperationStatus::InProgress, "applying", 50, "applying resolved changes"),
        );

        let intent = build_intent(endpoint_id, &resolved);
        mutator
            .apply(&intent)
            .await
            .map_err(AppError::Mutator)?;

        self.transition(operation_id, OperationStatus::Completed, None).await?;
        self.set_sync_status(endpoint_id, SyncStatus::InSync).await?;
        crate::ws::publish(
            endpoint_id,
            crate::ws::OperationUpdate::new(operation_id, OperationStatus::Completed, "done", 100, "converged on target snapshot"),
        );
        Ok(())
    }

    pub async fn get_operation(&self, operation_id: Id) -> AppResult<Operation> {
        let row = sqlx::query("SELECT * FROM operations WHERE id = ?")
            .bind(operation_id.to_string())
            .fetch_optional(self.db.pool())
            .await?;
        row.map(|r| row_to_operation(&r)).transpose()?.ok_or(AppError::NotFound)
    }

    /// Only cancellable while still `pending` — once the pipeline has
    /// started applying changes, cancelling would leave the endpoint in
    /// an unknown state.
    pub async fn cancel_operation(&self, operation_id: Id) -> AppResult<()> {
        let op = self.get_operation(operation_id).await?;
        if op.status != OperationStatus::Pending {
            return Err(AppError::Validation(
                "only a pending operation can be cancelled".into(),
            ));
        }
        self.transition(operation_id, OperationStatus::Cancelled, None).await?;
        self.release(op.endpoint_id);
        Ok(())
    }

    pub async fn list_endpoint_operations(&self, endpoint_id: Id) -> AppResult<Vec<Operation>> {
        let rows = sqlx::query("SELECT * FROM operations WHERE endpoint_id = ? ORDER BY created_at DESC")
            .bind(endpoint_id.to_string())
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(row_to_operation).collect()
    }

    pub async fn list_pool_operations(&self, pool_id: Id) -> AppResult<Vec<Operation>> {
        let rows = sqlx::query("SELECT * FROM operations WHERE pool_id = ? ORDER BY created_at DESC")
            .bind(pool_id.to_string())
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(row_to_operation).collect()
    }

    /// Marks every still-active operation row as `failed: "interrupted"` —
    /// a prior process died mid-pipeline and left no in-memory owner to
    /// finish it. Run once at startup before any request is accepted.
    pub async fn recover_on_startup(&self) -> AppResult<u64> {
        let stuck: Vec<(String, String)> =
            sqlx::query_as("SELECT id, endpoint_id FROM operations WHERE status IN ('pending', 'in_progress')")
                .fetch_all(self.db.pool())
                .await?;
        for (id, _endpoint_id) in &stuck {
            sqlx::query(
                "UPDATE operations SET status = 'failed', error_message = 'interrupted', completed_at = ? WHERE id = ?",
            )
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.db.pool())
            .await?;
        }
        Ok(stuck.len() as u64)
    }

    /// Marks endpoints offline whose `last_seen` is older than the
    /// configured threshold. Intended to run on a periodic interval from
    /// `main.rs`.
    pub async fn sweep_heartbeats(&self, threshold_seconds: i64) -> AppResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::seconds(threshold_seconds);
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM endpoints WHERE sync_status != 'offline' AND (last_seen IS NULL OR last_seen < ?)",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(self.db.pool())
        .await?;
        for (id,) in &rows {
            sqlx::query("UPDATE endpoints SET sync_status = 'offline', updated_at = ? WHERE id = ?")
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(self.db.pool())
                .await?;
        }
        Ok(rows.len() as u64)
    }
}

// --- HTTP handlers (spec §6's /api/operations* routes) -----------------

pub mod handlers {
    use super::*;
    use crate::extractor::Principal;
    use axum::extract::{Extension, Json, Path};
    use axum::http::StatusCode;

    pub async fn get(
        _principal: Principal,
        Extension(coordinator): Extension<Coordinator>,
        Path(id): Path<Id>,
    ) -> AppResult<Json<Operation>> {
        Ok(Json(coordinator.get_operation(id).await?))
    }

    pub async fn cancel(
        principal: Principal,
        Extension(coordinator): Extension<Coordinator>,
        Path(id): Path<Id>,
    ) -> AppResult<StatusCode> {
        let op = coordinator.get_operation(id).await?;
        if let Principal::Endpoint(caller) = principal {
            crate::auth::authorize_self(caller, op.endpoint_id)?;
        }
        coordinator.cancel_operation(id).await?;
        Ok(StatusCode::NO_CONTENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, version: &str) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            version: version.to_string(),
            repository: "core".to_string(),
            installed_size: 0,
            dependencies: vec![],
        }
    }

    #[test]
    fn diff_detects_missing_and_mismatched_packages() {
        let current = vec![pkg("a", "1.0")];
        let target = vec![pkg("a", "1.0"), pkg("b", "2.0")];
        let conflicts = diff_packages(&current, &target);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].package, "b");
        assert!(conflicts[0].current_version.is_none());
        assert_eq!(conflicts[0].action, ConflictAction::Install);
    }

    #[test]
    fn diff_detects_packages_present_locally_but_absent_from_target() {
        let current = vec![pkg("a", "1.0"), pkg("stray", "9.9")];
        let target = vec![pkg("a", "1.0")];
        let conflicts = diff_packages(&current, &target);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].package, "stray");
        assert_eq!(conflicts[0].current_version.as_deref(), Some("9.9"));
        assert!(conflicts[0].target_version.is_none());
        assert_eq!(conflicts[0].action, ConflictAction::Remove);
    }

    #[test]
    fn manual_resolution_leaves_everything_unresolved() {
        let conflicts = vec![Conflict {
            package: "a".into(),
            current_version: Some("1.0".into()),
            target_version: Some("2.0".into()),
            action: ConflictAction::Upgrade,
        }];
        let (resolved, unresolved) = auto_resolve(&conflicts, ConflictResolution::Manual);
        assert!(resolved.is_empty());
        assert_eq!(unresolved.len(), 1);
    }

    #[test]
    fn newest_resolution_accepts_upgrades_and_blocks_downgrades() {
        let upgrade = vec![Conflict {
            package: "a".into(),
            current_version: Some("1.0".into()),
            target_version: Some("2.0".into()),
            action: ConflictAction::Upgrade,
        }];
        let (resolved, unresolved) = auto_resolve(&upgrade, ConflictResolution::Newest);
        assert_eq!(resolved.len(), 1);
        assert!(unresolved.is_empty());

        let downgrade = vec![Conflict {
            package: "a".into(),
            current_version: Some("2.0".into()),
            target_version: Some("1.0".into()),
            action: ConflictAction::Upgrade,
        }];
        let (resolved, unresolved) = auto_resolve(&downgrade, ConflictResolution::Newest);
        assert!(resolved.is_empty());
        assert_eq!(unresolved.len(), 1);
    }

    #[test]
    fn build_intent_sorts_resolved_conflicts_by_action() {
        let endpoint_id = Id::new();
        let resolved = vec![
            Conflict {
                package: "new-pkg".into(),
                current_version: None,
                target_version: Some("1.0".into()),
                action: ConflictAction::Install,
            },
            Conflict {
                package: "stray".into(),
                current_version: Some("9.9".into()),
                target_version: None,
                action: ConflictAction::Remove,
            },
            Conflict {
                package: "bumped".into(),
                current_version: Some("1.0".into()),
                target_version: Some("2.0".into()),
                action: ConflictAction::Upgrade,
            },
        ];
        let intent = build_intent(endpoint_id, &resolved);
        assert_eq!(intent.install, vec!["new-pkg".to_string()]);
        assert_eq!(intent.remove, vec!["stray".to_string()]);
        assert_eq!(intent.upgrade, vec![("bumped".to_string(), "2.0".to_string())]);
    }

    #[test]
    fn newest_resolution_accepts_removals_unconditionally() {
        let conflicts = vec![Conflict {
            package: "stray".into(),
            current_version: Some("9.9".into()),
            target_version: None,
            action: ConflictAction::Remove,
        }];
        let (resolved, unresolved) = auto_resolve(&conflicts, ConflictResolution::Newest);
        assert_eq!(resolved.len(), 1);
        assert!(unresolved.is_empty());
    }
}
