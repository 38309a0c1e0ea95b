//! Repository storage — one repository per `(endpoint_id, repo_name)`,
//! bulk-replaced per endpoint on each push (spec §3 Repository, invariant
//! R1).

use crate::db::Db;
use crate::error::AppError;
use crate::id::Id;
use crate::model::{Repository, RepositoryInput, RepositoryPackage};
use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;

fn row_to_repository(row: &sqlx::any::AnyRow) -> Result<Repository, AppError> {
    let id: String = row.try_get("id")?;
    let endpoint_id: String = row.try_get("endpoint_id")?;
    let mirrors_json: String = row.try_get("mirrors")?;
    let packages_json: String = row.try_get("packages")?;
    let last_updated: String = row.try_get("last_updated")?;
    let mirrors: Vec<String> = serde_json::from_str(&mirrors_json)
        .map_err(|e| AppError::Internal(format!("corrupt mirrors: {e}")))?;
    let packages: Vec<RepositoryPackage> = serde_json::from_str(&packages_json)
        .map_err(|e| AppError::Internal(format!("corrupt repository packages: {e}")))?;
    Ok(Repository {
        id: Id::from_str(&id).map_err(|e| AppError::Internal(e.to_string()))?,
        endpoint_id: Id::from_str(&endpoint_id).map_err(|e| AppError::Internal(e.to_string()))?,
        repo_name: row.try_get("repo_name")?,
        primary_url: row.try_get("primary_url")?,
        mirrors,
        packages,
        last_updated: last_updated
            .parse()
            .map_err(|_| AppError::Internal("corrupt repository timestamp".into()))?,
    })
}

/// Deletes every repository currently stored for the endpoint and inserts
/// the given list in its place, inside one transaction — never leaves
/// stale packages from a partial replace.
pub async fn bulk_replace(
    db: &Db,
    endpoint_id: Id,
    repos: Vec<RepositoryInput>,
) -> Result<(), AppError> {
    let mut tx = db.pool().begin().await?;
    sqlx::query("DELETE FROM repositories WHERE endpoint_id = ?")
        .bind(endpoint_id.to_string())
        .execute(&mut tx)
        .await?;
    let now = Utc::now().to_rfc3339();
    for repo in repos {
        let mirrors_json =
            serde_json::to_string(&repo.mirrors).map_err(|e| AppError::Internal(e.to_string()))?;
        let packages_json = serde_json::to_string(&repo.packages)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO repositories
                (id, endpoint_id, repo_name, primary_url, mirrors, packages, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Id::new().to_string())
        .bind(endpoint_id.to_string())
        .bind(&repo.repo_name)
        .bind(&repo.primary_url)
        .bind(&mirrors_json)
        .bind(&packages_json)
        .bind(&now)
        .execute(&mut tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn list_for_endpoint(db: &Db, endpoint_id: Id) -> Result<Vec<Repository>, AppError> {
    let rows = sqlx::query("SELECT * FROM repositories WHERE endpoint_id = ? ORDER BY repo_name")
        .bind(endpoint_id.to_string())
        .fetch_all(db.pool())
        .await?;
    rows.iter().map(row_to_repository).collect()
}

/// All repositories belonging to every endpoint currently in `pool_id`,
/// flattened — the Analyzer's raw input (spec §4.E).
pub async fn list_for_pool(db: &Db, pool_id: Id) -> Result<Vec<Repository>, AppError> {
    let rows = sqlx::query(
        "SELECT repositories.* FROM repositories
         JOIN endpoints ON endpoints.id = repositories.endpoint_id
         WHERE endpoints.pool_id = ?",
    )
    .bind(pool_id.to_string())
    .fetch_all(db.pool())
    .await?;
    rows.iter().map(row_to_repository).collect()
}
