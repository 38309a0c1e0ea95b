//! Pool Manager — pool CRUD, endpoint assignment/move/unassign, and the
//! pool aggregate status view. Spec §4.D.

use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::id::Id;
use crate::model::{Pool, PoolOverallStatus, PoolStatus, SyncPolicy, SyncStatus};
use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;

fn row_to_pool(row: &sqlx::any::AnyRow) -> AppResult<Pool> {
    let id: String = row.try_get("id")?;
    let target_snapshot_id: Option<String> = row.try_get("target_snapshot_id")?;
    let sync_policy_json: String = row.try_get("sync_policy")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let sync_policy: SyncPolicy = serde_json::from_str(&sync_policy_json)
        .map_err(|e| AppError::Internal(format!("corrupt sync_policy: {e}")))?;
    Ok(Pool {
        id: Id::from_str(&id).map_err(|e| AppError::Internal(e.to_string()))?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        target_snapshot_id: target_snapshot_id
            .map(|s| Id::from_str(&s))
            .transpose()
            .map_err(|e| AppError::Internal(e.to_string()))?,
        sync_policy,
        created_at: created_at
            .parse()
            .map_err(|_| AppError::Internal("corrupt pool timestamp".into()))?,
        updated_at: updated_at
            .parse()
            .map_err(|_| AppError::Internal("corrupt pool timestamp".into()))?,
        endpoint_ids: Vec::new(),
    })
}

async fn endpoint_ids_of(db: &Db, pool_id: Id) -> AppResult<Vec<Id>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM endpoints WHERE pool_id = ? ORDER BY created_at")
        .bind(pool_id.to_string())
        .fetch_all(db.pool())
        .await?;
    rows.into_iter()
        .map(|(id,)| Id::from_str(&id).map_err(|e| AppError::Internal(e.to_string())))
        .collect()
}

fn validate_name(name: &str) -> AppResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("name must not be empty".into()));
    }
    if trimmed.len() > 255 {
        return Err(AppError::Validation("name must be at most 255 characters".into()));
    }
    Ok(())
}

pub async fn create_pool(
    db: &Db,
    name: String,
    description: String,
    sync_policy: Option<SyncPolicy>,
) -> AppResult<Pool> {
    validate_name(&name)?;
    if description.len() > 1000 {
        return Err(AppError::Validation("description must be at most 1000 characters".into()));
    }
    if get_pool_by_name(db, &name).await?.is_some() {
        return Err(AppError::Validation("name already exists".into()));
    }

    let id = Id::new();
    let now = Utc::now();
    let policy = sync_policy.unwrap_or_default();
    let policy_json = serde_json::to_string(&policy).map_err(|e| AppError::Internal(e.to_string()))?;
    sqlx::query(
        "INSERT INTO pools (id, name, description, target_snapshot_id, sync_policy, created_at, updated_at)
         VALUES (?, ?, ?, NULL, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&name)
    .bind(&description)
    .bind(&policy_json)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(db.pool())
    .await?;

    Ok(Pool {
        id,
        name,
        description,
        target_snapshot_id: None,
        sync_policy: policy,
        created_at: now,
        updated_at: now,
        endpoint_ids: Vec::new(),
    })
}

pub async fn get_pool(db: &Db, id: Id) -> AppResult<Option<Pool>> {
    let row = sqlx::query("SELECT * FROM pools WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(db.pool())
        .await?;
    let Some(row) = row else { return Ok(None) };
    let mut pool = row_to_pool(&row)?;
    pool.endpoint_ids = endpoint_ids_of(db, pool.id).await?;
    Ok(Some(pool))
}

pub async fn get_pool_by_name(db: &Db, name: &str) -> AppResult<Option<Pool>> {
    let row = sqlx::query("SELECT * FROM pools WHERE name = ?")
        .bind(name)
        .fetch_optional(db.pool())
        .await?;
    let Some(row) = row else { return Ok(None) };
    let mut pool = row_to_pool(&row)?;
    pool.endpoint_ids = endpoint_ids_of(db, pool.id).await?;
    Ok(Some(pool))
}

/// Creation order, each with its current endpoint-id list populated — a
/// denormalised read; the authoritative relation is `Endpoint.pool_id`.
pub async fn list_pools(db: &Db) -> AppResult<Vec<Pool>> {
    let rows = sqlx::query("SELECT * FROM pools ORDER BY created_at")
        .fetch_all(db.pool())
        .await?;
    let mut pools = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut pool = row_to_pool(row)?;
        pool.endpoint_ids = endpoint_ids_of(db, pool.id).await?;
        pools.push(pool);
    }
    Ok(pools)
}

pub struct PoolUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sync_policy: Option<SyncPolicy>,
}

pub async fn update_pool(db: &Db, id: Id, update: PoolUpdate) -> AppResult<Pool> {
    let current = get_pool(db, id).await?.ok_or(AppError::NotFound)?;

    let name = update.name.unwrap_or(current.name);
    validate_name(&name)?;
    if let Some(existing) = get_pool_by_name(db, &name).await? {
        if existing.id != id {
            return Err(AppError::Validation("name already exists".into()));
        }
    }
    let description = update.description.unwrap_or(current.description);
    if description.len() > 1000 {
        return Err(AppError::Validation("description must be at most 1000 characters".into()));
    }
    let sync_policy = update.sync_policy.unwrap_or(current.sync_policy);
    let policy_json = serde_json::to_string(&sync_policy).map_err(|e| AppError::Internal(e.to_string()))?;
    let now = Utc::now();

    sqlx::query("UPDATE pools SET name = ?, description = ?, sync_policy = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(&policy_json)
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .execute(db.pool())
        .await?;

    get_pool(db, id).await?.ok_or(AppError::NotFound)
}

/// Detaches every assigned endpoint first, then deletes the pool row.
pub async fn delete_pool(db: &Db, id: Id) -> AppResult<()> {
    if get_pool(db, id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let members = endpoint_ids_of(db, id).await?;
    for endpoint_id in members {
        remove_endpoint(db, id, endpoint_id).await?;
    }
    sqlx::query("DELETE FROM pools WHERE id = ?")
        .bind(id.to_string())
        .execute(db.pool())
        .await?;
    Ok(())
}

async fn set_endpoint_status(db: &Db, endpoint_id: Id, status: SyncStatus) -> AppResult<()> {
    sqlx::query("UPDATE endpoints SET sync_status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(endpoint_id.to_string())
        .execute(db.pool())
        .await?;
    Ok(())
}

async fn endpoint_pool(db: &Db, endpoint_id: Id) -> AppResult<Option<Id>> {
    let pool_id: Option<String> = sqlx::query_scalar("SELECT pool_id FROM endpoints WHERE id = ?")
        .bind(endpoint_id.to_string())
        .fetch_optional(db.pool())
        .await?
        .flatten();
    pool_id
        .map(|s| Id::from_str(&s))
        .transpose()
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// If the endpoint is already in another pool, detaches it first.
/// Post-condition: the endpoint's `sync_status` is `behind` (the target
/// may differ from whatever it last synced to).
pub async fn assign_endpoint(db: &Db, pool_id: Id, endpoint_id: Id) -> AppResult<()> {
    if get_pool(db, pool_id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    if let Some(current) = endpoint_pool(db, endpoint_id).await? {
        if current != pool_id {
            remove_endpoint(db, current, endpoint_id).await?;
        }
    }
    sqlx::query("UPDATE endpoints SET pool_id = ?, updated_at = ? WHERE id = ?")
        .bind(pool_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(endpoint_id.to_string())
        .execute(db.pool())
        .await?;
    set_endpoint_status(db, endpoint_id, SyncStatus::Behind).await
}

/// Rejects if the endpoint's current pool is not `pool_id`.
/// Post-condition: `sync_status = offline`.
pub async fn remove_endpoint(db: &Db, pool_id: Id, endpoint_id: Id) -> AppResult<()> {
    match endpoint_pool(db, endpoint_id).await? {
        Some(current) if current == pool_id => {}
        _ => return Err(AppError::Validation("endpoint is not assigned to this pool".into())),
    }
    sqlx::query("UPDATE endpoints SET pool_id = NULL, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(endpoint_id.to_string())
        .execute(db.pool())
        .await?;
    set_endpoint_status(db, endpoint_id, SyncStatus::Offline).await
}

pub async fn move_endpoint_to_pool(
    db: &Db,
    endpoint_id: Id,
    from_pool_id: Id,
    to_pool_id: Id,
) -> AppResult<()> {
    match endpoint_pool(db, endpoint_id).await? {
        Some(current) if current == from_pool_id => {}
        _ => return Err(AppError::Validation("endpoint is not assigned to the source pool".into())),
    }
    assign_endpoint(db, to_pool_id, endpoint_id).await
}

/// Delegates to the State Manager, then sets every non-offline endpoint
/// in the pool to `behind`.
pub async fn set_target_state(
    db: &Db,
    state_manager: &crate::state_manager::StateManager,
    pool_id: Id,
    snapshot_id: Id,
) -> AppResult<()> {
    state_manager.set_target(pool_id, snapshot_id).await?;
    let members = endpoint_ids_of(db, pool_id).await?;
    for endpoint_id in members {
        let row: (String,) = sqlx::query_as("SELECT sync_status FROM endpoints WHERE id = ?")
            .bind(endpoint_id.to_string())
            .fetch_one(db.pool())
            .await?;
        if SyncStatus::parse(&row.0) != SyncStatus::Offline {
            set_endpoint_status(db, endpoint_id, SyncStatus::Behind).await?;
        }
    }
    Ok(())
}

pub async fn clear_target_state(db: &Db, pool_id: Id) -> AppResult<()> {
    sqlx::query("UPDATE pools SET target_snapshot_id = NULL, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(pool_id.to_string())
        .execute(db.pool())
        .await?;
    Ok(())
}

/// The aggregate status mapping from spec §4.D.
pub fn overall_status(total: u64, in_sync: u64, offline: u64) -> PoolOverallStatus {
    if total == 0 {
        PoolOverallStatus::Empty
    } else if in_sync == total {
        PoolOverallStatus::FullySynced
    } else if offline == total {
        PoolOverallStatus::AllOffline
    } else if in_sync > 0 && in_sync < total {
        PoolOverallStatus::PartiallySynced
    } else {
        PoolOverallStatus::OutOfSync
    }
}

pub async fn pool_status(db: &Db, pool_id: Id) -> AppResult<PoolStatus> {
    if get_pool(db, pool_id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let rows: Vec<(String,)> = sqlx::query_as("SELECT sync_status FROM endpoints WHERE pool_id = ?")
        .bind(pool_id.to_string())
        .fetch_all(db.pool())
        .await?;
    let total = rows.len() as u64;
    let mut in_sync = 0u64;
    let mut ahead = 0u64;
    let mut behind = 0u64;
    let mut offline = 0u64;
    for (status,) in &rows {
        match SyncStatus::parse(status) {
            SyncStatus::InSync => in_sync += 1,
            SyncStatus::Ahead => ahead += 1,
            SyncStatus::Behind => behind += 1,
            SyncStatus::Offline => offline += 1,
        }
    }
    let sync_percentage = if total == 0 { 100.0 } else { (in_sync as f64 / total as f64) * 100.0 };
    Ok(PoolStatus {
        pool_id,
        total_endpoints: total,
        in_sync_count: in_sync,
        ahead_count: ahead,
        behind_count: behind,
        offline_count: offline,
        sync_percentage,
        overall_status: overall_status(total, in_sync, offline),
    })
}

// --- HTTP handlers (spec §6's /api/pools* routes) ---------------------

pub mod handlers {
    use super::*;
    use crate::extractor::{AdminAuth, Principal};
    use axum::extract::{Extension, Json, Path};
    use axum::http::StatusCode;
    use serde::Deserialize;

    #[derive(Deserialize)]
    pub struct CreatePoolBody {
        pub name: String,
        #[serde(default)]
        pub description: String,
        #[serde(default)]
        pub sync_policy: Option<SyncPolicy>,
    }

    pub async fn create(
        _admin: AdminAuth,
        Extension(db): Extension<Db>,
        Json(body): Json<CreatePoolBody>,
    ) -> AppResult<(StatusCode, Json<Pool>)> {
        let pool = create_pool(&db, body.name, body.description, body.sync_policy).await?;
        Ok((StatusCode::CREATED, Json(pool)))
    }

    pub async fn list(_principal: Principal, Extension(db): Extension<Db>) -> AppResult<Json<Vec<Pool>>> {
        Ok(Json(list_pools(&db).await?))
    }

    pub async fn get(
        _principal: Principal,
        Extension(db): Extension<Db>,
        Path(id): Path<Id>,
    ) -> AppResult<Json<Pool>> {
        Ok(Json(get_pool(&db, id).await?.ok_or(AppError::NotFound)?))
    }

    #[derive(Deserialize)]
    pub struct UpdatePoolBody {
        pub name: Option<String>,
        pub description: Option<String>,
        pub sync_policy: Option<SyncPolicy>,
    }

    pub async fn update(
        _admin: AdminAuth,
        Extension(db): Extension<Db>,
        Path(id): Path<Id>,
        Json(body): Json<UpdatePoolBody>,
    ) -> AppResult<Json<Pool>> {
        let pool = update_pool(
            &db,
            id,
            PoolUpdate {
                name: body.name,
                description: body.description,
                sync_policy: body.sync_policy,
            },
        )
        .await?;
        Ok(Json(pool))
    }

    pub async fn delete(
        _admin: AdminAuth,
        Extension(db): Extension<Db>,
        Path(id): Path<Id>,
    ) -> AppResult<StatusCode> {
        delete_pool(&db, id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn status(
        _principal: Principal,
        Extension(db): Extension<Db>,
        Path(id): Path<Id>,
    ) -> AppResult<Json<PoolStatus>> {
        Ok(Json(pool_status(&db, id).await?))
    }

    #[derive(Deserialize)]
    pub struct AddEndpointBody {
        pub endpoint_id: Id,
    }

    pub async fn add_endpoint(
        _admin: AdminAuth,
        Extension(db): Extension<Db>,
        Path(pool_id): Path<Id>,
        Json(body): Json<AddEndpointBody>,
    ) -> AppResult<StatusCode> {
        assign_endpoint(&db, pool_id, body.endpoint_id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn remove_endpoint_route(
        _admin: AdminAuth,
        Extension(db): Extension<Db>,
        Path((pool_id, endpoint_id)): Path<(Id, Id)>,
    ) -> AppResult<StatusCode> {
        remove_endpoint(&db, pool_id, endpoint_id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn move_endpoint(
        _admin: AdminAuth,
        Extension(db): Extension<Db>,
        Path((from_pool_id, endpoint_id, to_pool_id)): Path<(Id, Id, Id)>,
    ) -> AppResult<StatusCode> {
        move_endpoint_to_pool(&db, endpoint_id, from_pool_id, to_pool_id).await?;
        Ok(StatusCode::NO_CONTENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_status_mapping_matches_spec_table() {
        assert_eq!(overall_status(0, 0, 0), PoolOverallStatus::Empty);
        assert_eq!(overall_status(3, 3, 0), PoolOverallStatus::FullySynced);
        assert_eq!(overall_status(3, 0, 3), PoolOverallStatus::AllOffline);
        assert_eq!(overall_status(3, 1, 0), PoolOverallStatus::PartiallySynced);
        assert_eq!(overall_status(3, 0, 1), PoolOverallStatus::OutOfSync);
    }
}
