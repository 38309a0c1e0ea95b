//! State Manager — stores immutable package-set snapshots and designates
//! one of them as each pool's target. Spec §4.C.

use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::id::Id;
use crate::model::{PackageRecord, Snapshot, SystemStateReport};
use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;

#[derive(Clone)]
pub struct StateManager {
    db: Db,
}

fn row_to_snapshot(row: &sqlx::any::AnyRow) -> Result<Snapshot, AppError> {
    let id: String = row.try_get("id")?;
    let pool_id: String = row.try_get("pool_id")?;
    let endpoint_id: String = row.try_get("endpoint_id")?;
    let captured_at: String = row.try_get("captured_at")?;
    let packages_json: String = row.try_get("packages")?;
    let packages: Vec<PackageRecord> = serde_json::from_str(&packages_json)
        .map_err(|e| AppError::Internal(format!("corrupt snapshot packages: {e}")))?;
    Ok(Snapshot {
        id: Id::from_str(&id).map_err(|e| AppError::Internal(e.to_string()))?,
        pool_id: Id::from_str(&pool_id).map_err(|e| AppError::Internal(e.to_string()))?,
        endpoint_id: Id::from_str(&endpoint_id).map_err(|e| AppError::Internal(e.to_string()))?,
        captured_at: captured_at
            .parse()
            .map_err(|_| AppError::Internal("corrupt snapshot timestamp".into()))?,
        pacman_version: row.try_get("pacman_version")?,
        architecture: row.try_get("architecture")?,
        packages,
    })
}

impl StateManager {
    pub fn new(db: Db) -> Self {
        StateManager { db }
    }

    /// Requires the endpoint to exist and be assigned to a pool; persists
    /// the snapshot against that pool. Fails with `EndpointNotAssigned`
    /// (surfaced as a `ValidationError`) otherwise.
    pub async fn save_snapshot(&self, endpoint_id: Id, state: SystemStateReport) -> AppResult<Id> {
        let pool_id: Option<String> =
            sqlx::query_scalar("SELECT pool_id FROM endpoints WHERE id = ?")
                .bind(endpoint_id.to_string())
                .fetch_optional(self.db.pool())
                .await?
                .flatten();
        let Some(pool_id) = pool_id else {
            return Err(AppError::Validation(format!(
                "endpoint {endpoint_id} not found or not assigned to a pool"
            )));
        };

        let snapshot_id = Id::new();
        let captured_at = Utc::now();
        let packages_json = serde_json::to_string(&state.packages)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO snapshots
                (id, pool_id, endpoint_id, captured_at, pacman_version, architecture, packages)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(snapshot_id.to_string())
        .bind(&pool_id)
        .bind(endpoint_id.to_string())
        .bind(captured_at.to_rfc3339())
        .bind(&state.pacman_version)
        .bind(&state.architecture)
        .bind(&packages_json)
        .execute(self.db.pool())
        .await?;
        self.prune_old_snapshots(endpoint_id).await?;
        Ok(snapshot_id)
    }

    /// Deletes this endpoint's snapshots beyond `snapshots.retain_per_endpoint`
    /// (§6), oldest first. A snapshot currently designated as some pool's
    /// target is never deleted regardless of age (invariant S2).
    async fn prune_old_snapshots(&self, endpoint_id: Id) -> AppResult<()> {
        let retain = *crate::config::SNAPSHOTS_RETAIN_PER_ENDPOINT as usize;
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM snapshots WHERE endpoint_id = ? ORDER BY captured_at DESC",
        )
        .bind(endpoint_id.to_string())
        .fetch_all(self.db.pool())
        .await?;
        if ids.len() <= retain {
            return Ok(());
        }

        let targeted: std::collections::HashSet<String> = sqlx::query_scalar(
            "SELECT target_snapshot_id FROM pools WHERE target_snapshot_id IS NOT NULL",
        )
        .fetch_all(self.db.pool())
        .await?
        .into_iter()
        .collect();

        for id in ids.into_iter().skip(retain) {
            if targeted.contains(&id) {
                continue;
            }
            sqlx::query("DELETE FROM snapshots WHERE id = ?")
                .bind(&id)
                .execute(self.db.pool())
                .await?;
        }
        Ok(())
    }

    pub async fn get_snapshot(&self, snapshot_id: Id) -> AppResult<Option<Snapshot>> {
        let row = sqlx::query("SELECT * FROM snapshots WHERE id = ?")
            .bind(snapshot_id.to_string())
            .fetch_optional(self.db.pool())
            .await?;
        row.map(|r| row_to_snapshot(&r)).transpose()
    }

    pub async fn get_target_snapshot(&self, pool_id: Id) -> AppResult<Option<Snapshot>> {
        let target: Option<String> =
            sqlx::query_scalar("SELECT target_snapshot_id FROM pools WHERE id = ?")
                .bind(pool_id.to_string())
                .fetch_optional(self.db.pool())
                .await?
                .flatten();
        let Some(target) = target else {
            return Ok(None);
        };
        let target_id = Id::from_str(&target).map_err(|e| AppError::Internal(e.to_string()))?;
        self.get_snapshot(target_id).await
    }

    /// Most recent first.
    pub async fn get_endpoint_snapshots(&self, endpoint_id: Id, limit: u32) -> AppResult<Vec<Snapshot>> {
        let rows = sqlx::query(
            "SELECT * FROM snapshots WHERE endpoint_id = ? ORDER BY captured_at DESC LIMIT ?",
        )
        .bind(endpoint_id.to_string())
        .bind(limit as i64)
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(row_to_snapshot).collect()
    }

    /// The second-most-recent snapshot for that endpoint — the "previous"
    /// for revert purposes.
    pub async fn get_previous_snapshot(&self, endpoint_id: Id) -> AppResult<Option<Snapshot>> {
        let snapshots = self.get_endpoint_snapshots(endpoint_id, 2).await?;
        Ok(snapshots.into_iter().nth(1))
    }

    /// Updates `Pool.target_snapshot_id` under a single transaction. Fails
    /// with `SnapshotNotFound` if the snapshot is not persisted.
    pub async fn set_target(&self, pool_id: Id, snapshot_id: Id) -> AppResult<()> {
        let mut tx = self.db.pool().begin().await?;
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM snapshots WHERE id = ?")
            .bind(snapshot_id.to_string())
            .fetch_optional(&mut tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound);
        }
        sqlx::query("UPDATE pools SET target_snapshot_id = ?, updated_at = ? WHERE id = ?")
            .bind(snapshot_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(pool_id.to_string())
            .execute(&mut tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
