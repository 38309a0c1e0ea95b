use poolsyncd::coordinator::Coordinator;
use poolsyncd::db::{migrations, Db, DbKind};
use poolsyncd::model::{OperationStatus, PackageRecord, SystemStateReport};
use poolsyncd::mutator::SimulatedMutator;
use poolsyncd::{endpoints, pool_manager, state_manager::StateManager};
use std::sync::Arc;

async fn embedded_db() -> Db {
    let db = Db::connect(DbKind::Embedded, "sqlite::memory:", 1, 1)
        .await
        .unwrap();
    migrations::run(&db).await.unwrap();
    db
}

fn pkg(name: &str, version: &str) -> PackageRecord {
    PackageRecord {
        name: name.to_string(),
        version: version.to_string(),
        repository: "core".to_string(),
        installed_size: 0,
        dependencies: vec![],
    }
}

// S6 — rows left `pending`/`in_progress` by a killed process are recovered
// as `failed: interrupted` on the next startup, and the endpoints they
// belonged to accept new operations immediately afterward.
#[tokio::test]
async fn s6_crash_recovery_marks_stuck_operations_failed() {
    let db = embedded_db().await;
    let state = StateManager::new(db.clone());

    let pool = pool_manager::create_pool(&db, "prod".to_string(), String::new(), None)
        .await
        .unwrap();
    let e1 = endpoints::register(
        &db,
        endpoints::RegisterRequest {
            name: "alpha".to_string(),
            hostname: "h1".to_string(),
        },
    )
    .await
    .unwrap()
    .endpoint;
    pool_manager::assign_endpoint(&db, pool.id, e1.id).await.unwrap();
    state
        .save_snapshot(
            e1.id,
            SystemStateReport {
                pacman_version: "6.0.1".to_string(),
                architecture: "x86_64".to_string(),
                packages: vec![pkg("gcc", "11.2.0")],
            },
        )
        .await
        .unwrap();

    // Simulate a process that died mid-pipeline: insert an operation row
    // directly as `in_progress`, bypassing the coordinator's own
    // single-flight bookkeeping (which lives only in that dead process's
    // memory and is gone on restart).
    let stuck_id = poolsyncd::id::Id::new();
    sqlx::query(
        "INSERT INTO operations
            (id, pool_id, endpoint_id, kind, status, details, error_message, created_at, completed_at)
         VALUES (?, ?, ?, 'sync_to_latest', 'in_progress', '{}', NULL, ?, NULL)",
    )
    .bind(stuck_id.to_string())
    .bind(pool.id.to_string())
    .bind(e1.id.to_string())
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(db.pool())
    .await
    .unwrap();

    // A fresh process wires up a new coordinator (empty in-memory
    // single-flight map) and runs recovery before accepting requests.
    let coordinator = Coordinator::new(db.clone(), state.clone(), Arc::new(SimulatedMutator));
    let recovered = coordinator.recover_on_startup().await.unwrap();
    assert_eq!(recovered, 1);

    let op = coordinator.get_operation(stuck_id).await.unwrap();
    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.error_message.as_deref(), Some("interrupted"));

    // The endpoint's single-flight slot is free again.
    let new_op = coordinator.set_as_latest(e1.id).await;
    assert!(new_op.is_ok());
}
