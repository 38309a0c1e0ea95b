//! Ordered schema migrations, applied once each and recorded in
//! `schema_migrations` — spec §4.A.
//!
//! Every column this crate needs (ids, timestamps, package lists) is kept
//! as `TEXT` on both engines: ids are generated in the application layer
//! (no `DEFAULT gen_random_uuid()` / `AUTOINCREMENT` divergence), rows are
//! read back by their known id rather than `RETURNING` (no divergence
//! there either), and JSON-shaped columns are opaque blobs decoded in
//! Rust (no JSON-operator divergence). That is what lets a single DDL
//! string serve both the PostgreSQL and SQLite arms of [`super::Db`]; the
//! `Migration` type still carries a per-engine hook for the day a step
//! genuinely needs one (e.g. a future column type no single text form can
//! represent).

use super::Db;
use tracing::info;

pub struct Migration {
    pub version: &'static str,
    pub up: &'static [&'static str],
}

fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: "0001_create_core_tables",
            up: &[
                "CREATE TABLE IF NOT EXISTS pools (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL DEFAULT '',
                    target_snapshot_id TEXT NULL,
                    sync_policy TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                "CREATE TABLE IF NOT EXISTS endpoints (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    hostname TEXT NOT NULL,
                    pool_id TEXT NULL,
                    last_seen TEXT NULL,
                    sync_status TEXT NOT NULL,
                    auth_token_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                "CREATE UNIQUE INDEX IF NOT EXISTS endpoints_name_hostname
                    ON endpoints (name, hostname)",
                "CREATE TABLE IF NOT EXISTS snapshots (
                    id TEXT PRIMARY KEY,
                    pool_id TEXT NOT NULL,
                    endpoint_id TEXT NOT NULL,
                    captured_at TEXT NOT NULL,
                    pacman_version TEXT NOT NULL,
                    architecture TEXT NOT NULL,
                    packages TEXT NOT NULL
                )",
                "CREATE INDEX IF NOT EXISTS snapshots_endpoint_captured
                    ON snapshots (endpoint_id, captured_at)",
                "CREATE TABLE IF NOT EXISTS repositories (
                    id TEXT PRIMARY KEY,
                    endpoint_id TEXT NOT NULL,
                    repo_name TEXT NOT NULL,
                    primary_url TEXT NOT NULL,
                    mirrors TEXT NOT NULL,
                    packages TEXT NOT NULL,
                    last_updated TEXT NOT NULL
                )",
                "CREATE UNIQUE INDEX IF NOT EXISTS repositories_endpoint_name
                    ON repositories (endpoint_id, repo_name)",
                "CREATE TABLE IF NOT EXISTS operations (
                    id TEXT PRIMARY KEY,
                    pool_id TEXT NOT NULL,
                    endpoint_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    status TEXT NOT NULL,
                    details TEXT NOT NULL,
                    error_message TEXT NULL,
                    created_at TEXT NOT NULL,
                    completed_at TEXT NULL
                )",
                "CREATE INDEX IF NOT EXISTS operations_endpoint_status
                    ON operations (endpoint_id, status)",
            ],
        },
        Migration {
            version: "0002_operations_pool_index",
            up: &["CREATE INDEX IF NOT EXISTS operations_pool_created
                ON operations (pool_id, created_at)"],
        },
    ]
}

/// Applies every migration not yet recorded in `schema_migrations`, in
/// order. A failing statement aborts the whole batch without recording
/// the migration as applied.
pub async fn run(db: &Db) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(db.pool())
    .await?;

    for migration in migrations() {
        let already_applied: Option<(String,)> =
            sqlx::query_as("SELECT version FROM schema_migrations WHERE version = ?")
                .bind(migration.version)
                .fetch_optional(db.pool())
                .await?;
        if already_applied.is_some() {
            continue;
        }
        info!(version = migration.version, kind = ?db.kind(), "applying migration");
        for statement in migration.up {
            sqlx::query(statement).execute(db.pool()).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(migration.version)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(db.pool())
            .await?;
    }
    Ok(())
}

/// Returns the recorded versions, most recently applied last — used by
/// the `migrate status` external runner (spec §6's CLI note).
pub async fn status(db: &Db) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT version FROM schema_migrations ORDER BY applied_at")
            .fetch_all(db.pool())
            .await?;
    Ok(rows.into_iter().map(|(v,)| v).collect())
}
