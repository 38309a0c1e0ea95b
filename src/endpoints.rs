//! Endpoint registration, heartbeat, and repository push — spec §4.B,
//! §4.G.

use crate::auth;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::id::Id;
use crate::model::{Endpoint, RepositoryInput, SyncStatus};
use crate::repo_analyzer;
use crate::repositories;
use chrono::Utc;
use serde::Deserialize;
use sqlx::Row;
use std::str::FromStr;

fn row_to_endpoint(row: &sqlx::any::AnyRow) -> AppResult<Endpoint> {
    let id: String = row.try_get("id")?;
    let pool_id: Option<String> = row.try_get("pool_id")?;
    let last_seen: Option<String> = row.try_get("last_seen")?;
    let sync_status: String = row.try_get("sync_status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(Endpoint {
        id: Id::from_str(&id).map_err(|e| AppError::Internal(e.to_string()))?,
        name: row.try_get("name")?,
        hostname: row.try_get("hostname")?,
        pool_id: pool_id
            .map(|s| Id::from_str(&s))
            .transpose()
            .map_err(|e| AppError::Internal(e.to_string()))?,
        last_seen: last_seen
            .map(|s| s.parse())
            .transpose()
            .map_err(|_| AppError::Internal("corrupt endpoint timestamp".into()))?,
        sync_status: SyncStatus::parse(&sync_status),
        created_at: created_at
            .parse()
            .map_err(|_| AppError::Internal("corrupt endpoint timestamp".into()))?,
        updated_at: updated_at
            .parse()
            .map_err(|_| AppError::Internal("corrupt endpoint timestamp".into()))?,
    })
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub hostname: String,
}

pub struct Registration {
    pub endpoint: Endpoint,
    pub token: String,
}

/// Registers a new endpoint, or re-registers an existing `(name,
/// hostname)` pair, rotating its bearer token either way — spec §4.G:
/// re-registration invalidates any previously issued token for that
/// endpoint.
pub async fn register(db: &Db, req: RegisterRequest) -> AppResult<Registration> {
    let name = req.name.trim();
    let hostname = req.hostname.trim();
    if name.is_empty() || name.len() > 255 {
        return Err(AppError::Validation("name must be 1-255 characters".into()));
    }
    if hostname.is_empty() || hostname.len() > 255 {
        return Err(AppError::Validation("hostname must be 1-255 characters".into()));
    }

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM endpoints WHERE name = ? AND hostname = ?")
            .bind(name)
            .bind(hostname)
            .fetch_optional(db.pool())
            .await?;

    let id = match existing {
        Some((id,)) => Id::from_str(&id).map_err(|e| AppError::Internal(e.to_string()))?,
        None => Id::new(),
    };
    let token = auth::issue_token(id)?;
    let token_hash = auth::hash_token(&token);
    let now = Utc::now();

    if existing.is_some() {
        sqlx::query("UPDATE endpoints SET auth_token_hash = ?, updated_at = ? WHERE id = ?")
            .bind(&token_hash)
            .bind(now.to_rfc3339())
            .bind(id.to_string())
            .execute(db.pool())
            .await?;
    } else {
        sqlx::query(
            "INSERT INTO endpoints
                (id, name, hostname, pool_id, last_seen, sync_status, auth_token_hash, created_at, updated_at)
             VALUES (?, ?, ?, NULL, NULL, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(hostname)
        .bind(SyncStatus::Offline.as_str())
        .bind(&token_hash)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(db.pool())
        .await?;
    }

    let endpoint = get(db, id).await?.ok_or(AppError::NotFound)?;
    Ok(Registration { endpoint, token })
}

pub async fn get(db: &Db, id: Id) -> AppResult<Option<Endpoint>> {
    let row = sqlx::query("SELECT * FROM endpoints WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(db.pool())
        .await?;
    row.map(|r| row_to_endpoint(&r)).transpose()
}

pub async fn list(db: &Db, pool_id: Option<Id>) -> AppResult<Vec<Endpoint>> {
    let rows = match pool_id {
        Some(pool_id) => {
            sqlx::query("SELECT * FROM endpoints WHERE pool_id = ? ORDER BY created_at")
                .bind(pool_id.to_string())
                .fetch_all(db.pool())
                .await?
        }
        None => {
            sqlx::query("SELECT * FROM endpoints ORDER BY created_at")
                .fetch_all(db.pool())
                .await?
        }
    };
    rows.iter().map(row_to_endpoint).collect()
}

/// Treats the call itself as a "re-seen" heartbeat event (E2): the
/// caller-supplied `status` is recorded for observability but never
/// drives the state machine directly. `last_seen` always advances; an
/// endpoint currently `offline` moves to `behind` (it must be assumed
/// stale until it reports a fresh snapshot), any other status is
/// untouched.
pub async fn heartbeat(db: &Db, id: Id, reported_status: &str) -> AppResult<Endpoint> {
    let endpoint = get(db, id).await?.ok_or(AppError::NotFound)?;
    tracing::debug!(endpoint_id = %id, reported_status, "endpoint heartbeat");

    let next_status = if endpoint.sync_status == SyncStatus::Offline {
        SyncStatus::Behind
    } else {
        endpoint.sync_status
    };

    sqlx::query("UPDATE endpoints SET last_seen = ?, sync_status = ?, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(next_status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(db.pool())
        .await?;

    get(db, id).await?.ok_or(AppError::NotFound)
}

/// Bulk-replaces the endpoint's repository index, then re-triggers the
/// pool's compatibility analysis in the background if it belongs to one
/// (spec §4.E).
pub async fn push_repositories(db: &Db, endpoint_id: Id, repos: Vec<RepositoryInput>) -> AppResult<()> {
    let endpoint = get(db, endpoint_id).await?.ok_or(AppError::NotFound)?;
    repositories::bulk_replace(db, endpoint_id, repos).await?;

    if let Some(pool_id) = endpoint.pool_id {
        let policy_json: Option<String> = sqlx::query_scalar("SELECT sync_policy FROM pools WHERE id = ?")
            .bind(pool_id.to_string())
            .fetch_optional(db.pool())
            .await?;
        if let Some(policy_json) = policy_json {
            let policy = serde_json::from_str(&policy_json).map_err(|e| AppError::Internal(e.to_string()))?;
            tokio::spawn(repo_analyzer::reanalyze_in_background(db.clone(), pool_id, policy));
        }
    }
    Ok(())
}

pub async fn list_repositories(db: &Db, endpoint_id: Id) -> AppResult<Vec<crate::model::Repository>> {
    if get(db, endpoint_id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    repositories::list_for_endpoint(db, endpoint_id).await
}

/// Removes the endpoint and every dependent row (snapshots, operations,
/// repositories) — there is no "soft delete" in this model, matching the
/// original's hard-delete semantics (spec's Non-goals exclude an
/// endpoint archive/history feature).
pub async fn delete(db: &Db, id: Id) -> AppResult<()> {
    if get(db, id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let mut tx = db.pool().begin().await?;
    sqlx::query("DELETE FROM operations WHERE endpoint_id = ?")
        .bind(id.to_string())
        .execute(&mut tx)
        .await?;
    sqlx::query("DELETE FROM snapshots WHERE endpoint_id = ?")
        .bind(id.to_string())
        .execute(&mut tx)
        .await?;
    sqlx::query("DELETE FROM repositories WHERE endpoint_id = ?")
        .bind(id.to_string())
        .execute(&mut tx)
        .await?;
    sqlx::query("DELETE FROM endpoints WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

// --- HTTP handlers (spec §6's /api/endpoints* routes) ------------------

pub mod handlers {
    use super::*;
    use crate::extractor::{AdminAuth, EndpointAuth, Principal};
    use crate::model::SystemStateReport;
    use axum::extract::{Extension, Json, Path};
    use axum::http::StatusCode;
    use serde::Deserialize;

    pub async fn register(
        Extension(db): Extension<Db>,
        Json(body): Json<RegisterRequest>,
    ) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
        let reg = super::register(&db, body).await?;
        Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({ "endpoint": reg.endpoint, "token": reg.token })),
        ))
    }

    pub async fn list(
        _principal: Principal,
        Extension(db): Extension<Db>,
    ) -> AppResult<Json<Vec<Endpoint>>> {
        Ok(Json(super::list(&db, None).await?))
    }

    /// Detail view — any authenticated caller, not restricted to self.
    pub async fn get(
        _principal: Principal,
        Extension(db): Extension<Db>,
        Path(id): Path<Id>,
    ) -> AppResult<Json<Endpoint>> {
        Ok(Json(super::get(&db, id).await?.ok_or(AppError::NotFound)?))
    }

    #[derive(Deserialize)]
    pub struct StatusBody {
        #[serde(default)]
        pub status: String,
    }

    pub async fn heartbeat(
        EndpointAuth(caller): EndpointAuth,
        Extension(db): Extension<Db>,
        Path(id): Path<Id>,
        Json(body): Json<StatusBody>,
    ) -> AppResult<Json<Endpoint>> {
        crate::auth::authorize_self(caller, id)?;
        Ok(Json(super::heartbeat(&db, id, &body.status).await?))
    }

    pub async fn push_repositories(
        EndpointAuth(caller): EndpointAuth,
        Extension(db): Extension<Db>,
        Path(id): Path<Id>,
        Json(repos): Json<Vec<RepositoryInput>>,
    ) -> AppResult<StatusCode> {
        crate::auth::authorize_self(caller, id)?;
        super::push_repositories(&db, id, repos).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn list_repositories(
        _principal: Principal,
        Extension(db): Extension<Db>,
        Path(id): Path<Id>,
    ) -> AppResult<Json<Vec<crate::model::Repository>>> {
        Ok(Json(super::list_repositories(&db, id).await?))
    }

    pub async fn delete(
        principal: Principal,
        Extension(db): Extension<Db>,
        Path(id): Path<Id>,
    ) -> AppResult<StatusCode> {
        if let Principal::Endpoint(caller) = principal {
            crate::auth::authorize_self(caller, id)?;
        }
        super::delete(&db, id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn save_state(
        EndpointAuth(caller): EndpointAuth,
        Extension(state): Extension<crate::state_manager::StateManager>,
        Path(id): Path<Id>,
        Json(report): Json<SystemStateReport>,
    ) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
        crate::auth::authorize_self(caller, id)?;
        let snapshot_id = state.save_snapshot(id, report).await?;
        Ok((StatusCode::CREATED, Json(serde_json::json!({ "snapshot_id": snapshot_id }))))
    }

    pub async fn state_history(
        _principal: Principal,
        Extension(state): Extension<crate::state_manager::StateManager>,
        Path(id): Path<Id>,
    ) -> AppResult<Json<Vec<crate::model::Snapshot>>> {
        Ok(Json(
            state
                .get_endpoint_snapshots(id, *crate::config::SNAPSHOTS_RETAIN_PER_ENDPOINT as u32)
                .await?,
        ))
    }

    pub async fn operations(
        _principal: Principal,
        Extension(coordinator): Extension<crate::coordinator::Coordinator>,
        Path(id): Path<Id>,
    ) -> AppResult<Json<Vec<crate::model::Operation>>> {
        Ok(Json(coordinator.list_endpoint_operations(id).await?))
    }

    fn require_self_or_admin(principal: Principal, id: Id) -> AppResult<()> {
        if let Principal::Endpoint(caller) = principal {
            crate::auth::authorize_self(caller, id)?;
        }
        Ok(())
    }

    pub async fn sync_to_latest(
        principal: Principal,
        Extension(coordinator): Extension<crate::coordinator::Coordinator>,
        Path(id): Path<Id>,
    ) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
        require_self_or_admin(principal, id)?;
        let operation_id = coordinator.sync_to_latest(id).await?;
        Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "operation_id": operation_id }))))
    }

    pub async fn set_as_latest(
        principal: Principal,
        Extension(coordinator): Extension<crate::coordinator::Coordinator>,
        Path(id): Path<Id>,
    ) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
        require_self_or_admin(principal, id)?;
        let operation_id = coordinator.set_as_latest(id).await?;
        Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "operation_id": operation_id }))))
    }

    pub async fn revert_to_previous(
        principal: Principal,
        Extension(coordinator): Extension<crate::coordinator::Coordinator>,
        Path(id): Path<Id>,
    ) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
        require_self_or_admin(principal, id)?;
        let operation_id = coordinator.revert_to_previous(id).await?;
        Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "operation_id": operation_id }))))
    }
}
