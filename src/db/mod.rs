//! Storage driver abstraction — isolates the PostgreSQL / SQLite dialect
//! difference behind one handle, per spec §4.A.
//!
//! Both engines are reached through `sqlx`'s database-agnostic `Any`
//! driver, which accepts the same `?`-style bind parameters and row
//! accessors for either backend. Every persisted JSON-shaped column
//! (`Snapshot.packages`, `Repository.packages`, `Operation.details`,
//! `Pool.sync_policy`) is stored as a serialized `TEXT` column and decoded
//! in Rust rather than queried with engine-specific JSON operators, so no
//! other part of the dialect needs isolating.

pub mod migrations;

use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::AnyPool;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Embedded,
    Server,
}

impl DbKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "server" => DbKind::Server,
            _ => DbKind::Embedded,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DbKind::Embedded => "embedded",
            DbKind::Server => "server",
        }
    }
}

#[derive(Clone)]
pub struct Db {
    pool: AnyPool,
    kind: DbKind,
}

impl Db {
    pub async fn connect(
        kind: DbKind,
        url: &str,
        min_size: u32,
        max_size: u32,
    ) -> Result<Self, sqlx::Error> {
        sqlx::any::install_default_drivers();
        let pool = match kind {
            // One serialised writer: the embedded engine is a single file,
            // concurrent writers would just contend on its lock anyway.
            DbKind::Embedded => {
                AnyPoolOptions::new()
                    .min_connections(1)
                    .max_connections(1)
                    .connect(url)
                    .await?
            }
            DbKind::Server => {
                AnyPoolOptions::new()
                    .min_connections(min_size)
                    .max_connections(max_size.max(min_size).max(1))
                    .idle_timeout(Duration::from_secs(300))
                    .connect(url)
                    .await?
            }
        };
        Ok(Db { pool, kind })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    /// Placeholder token for the `i`-th (1-based) bind parameter. The `Any`
    /// driver normalizes both backends to unindexed `?`, but the accessor
    /// is kept so call sites read the same regardless of which concrete
    /// engine answers them, matching the driver contract in spec §4.A.
    pub fn placeholder(&self, _i: usize) -> &'static str {
        "?"
    }

    pub async fn health_ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    pub async fn fetch_scalar_i64(&self, sql: &str) -> Result<i64, sqlx::Error> {
        use sqlx::Row;
        let row: AnyRow = sqlx::query(sql).fetch_one(&self.pool).await?;
        row.try_get::<i64, _>(0)
    }
}
