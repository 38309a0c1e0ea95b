use poolsyncd::coordinator::Coordinator;
use poolsyncd::db::{migrations, Db, DbKind};
use poolsyncd::model::{
    ConflictResolution, Endpoint, Operation, OperationStatus, PackageRecord, SyncPolicy,
    SyncStatus, SystemStateReport,
};
use poolsyncd::mutator::SimulatedMutator;
use poolsyncd::{endpoints, pool_manager, state_manager::StateManager};
use std::sync::Arc;
use std::time::Duration;

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

async fn register(db: &Db, name: &str, hostname: &str) -> Endpoint {
    let req = endpoints::RegisterRequest {
        name: name.to_string(),
        hostname: hostname.to_string(),
    };
    endpoints::register(db, req).await.unwrap().endpoint
}

async fn wait_for_terminal(coordinator: &Coordinator, operation_id: poolsyncd::id::Id) -> Operation {
    for _ in 0..50 {
        let op = coordinator.get_operation(operation_id).await.unwrap();
        if op.status.is_terminal() {
            return op;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("operation {operation_id} never reached a terminal status");
}

// S1 — fresh pool, two endpoints converge under a `newest` policy.
#[tokio::test]
async fn s1_fresh_pool_two_endpoints_converge() {
    let db = embedded_db().await;
    let state = StateManager::new(db.clone());
    let coordinator = Coordinator::new(db.clone(), state.clone(), Arc::new(SimulatedMutator));

    let mut policy = SyncPolicy::default();
    policy.conflict_resolution = ConflictResolution::Newest;
    let pool = pool_manager::create_pool(&db, "prod".to_string(), String::new(), Some(policy))
        .await
        .unwrap();

    let e1 = register(&db, "alpha", "h1").await;
    let e2 = register(&db, "beta", "h2").await;
    pool_manager::assign_endpoint(&db, pool.id, e1.id).await.unwrap();
    pool_manager::assign_endpoint(&db, pool.id, e2.id).await.unwrap();

    let snapshot1_id = state
        .save_snapshot(
            e1.id,
            SystemStateReport {
                pacman_version: "6.0.1".to_string(),
                architecture: "x86_64".to_string(),
                packages: vec![pkg("gcc", "11.2.0"), pkg("python", "3.10.8")],
            },
        )
        .await
        .unwrap();

    let set_latest_op = coordinator.set_as_latest(e1.id).await.unwrap();
    let op = coordinator.get_operation(set_latest_op).await.unwrap();
    assert_eq!(op.status, OperationStatus::Completed);

    let target = state.get_target_snapshot(pool.id).await.unwrap().unwrap();
    assert_eq!(target.id, snapshot1_id);

    let e1_after = endpoints::get(&db, e1.id).await.unwrap().unwrap();
    let e2_after = endpoints::get(&db, e2.id).await.unwrap().unwrap();
    assert_eq!(e1_after.sync_status, SyncStatus::InSync);
    assert_eq!(e2_after.sync_status, SyncStatus::Behind);

    state
        .save_snapshot(
            e2.id,
            SystemStateReport {
                pacman_version: "6.0.1".to_string(),
                architecture: "x86_64".to_string(),
                packages: vec![pkg("gcc", "11.1.0"), pkg("python", "3.10.8")],
            },
        )
        .await
        .unwrap();

    let sync_op = coordinator.sync_to_latest(e2.id).await.unwrap();
    let op = wait_for_terminal(&coordinator, sync_op).await;
    assert_eq!(op.status, OperationStatus::Completed);

    let e2_final = endpoints::get(&db, e2.id).await.unwrap().unwrap();
    assert_eq!(e2_final.sync_status, SyncStatus::InSync);
}

// S2 — single-flight enforcement: a second sync against the same endpoint
// while one is still in progress is rejected; a different endpoint is not.
#[tokio::test]
async fn s2_single_flight_enforcement() {
    let db = embedded_db().await;
    let state = StateManager::new(db.clone());
    let coordinator = Coordinator::new(db.clone(), state.clone(), Arc::new(SimulatedMutator));

    let pool = pool_manager::create_pool(&db, "fleet".to_string(), String::new(), None)
        .await
        .unwrap();
    let e1 = register(&db, "alpha", "h1").await;
    let e2 = register(&db, "beta", "h2").await;
    pool_manager::assign_endpoint(&db, pool.id, e1.id).await.unwrap();
    pool_manager::assign_endpoint(&db, pool.id, e2.id).await.unwrap();

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
    coordinator.set_as_latest(e1.id).await.unwrap();

    state
        .save_snapshot(
            e2.id,
            SystemStateReport {
                pacman_version: "6.0.1".to_string(),
                architecture: "x86_64".to_string(),
                packages: vec![pkg("gcc", "11.1.0")],
            },
        )
        .await
        .unwrap();

    let before_count = coordinator.list_endpoint_operations(e2.id).await.unwrap().len();
    let first = coordinator.sync_to_latest(e2.id).await;
    assert!(first.is_ok());

    let second = coordinator.sync_to_latest(e2.id).await;
    assert!(second.is_err());
    let after_count = coordinator.list_endpoint_operations(e2.id).await.unwrap().len();
    assert_eq!(after_count, before_count + 1, "rejected call must not insert a new operation row");

    // A different endpoint is unaffected by e2's reservation.
    let e1_op = coordinator.sync_to_latest(e1.id).await;
    assert!(e1_op.is_ok(), "e1's own single-flight slot is free regardless of e2's reservation");
}

// S3 — manual conflict resolution leaves the operation failed and the
// endpoint's status untouched.
#[tokio::test]
async fn s3_manual_conflicts_are_not_auto_applied() {
    let db = embedded_db().await;
    let state = StateManager::new(db.clone());
    let coordinator = Coordinator::new(db.clone(), state.clone(), Arc::new(SimulatedMutator));

    let policy = SyncPolicy {
        conflict_resolution: ConflictResolution::Manual,
        ..SyncPolicy::default()
    };
    let pool = pool_manager::create_pool(&db, "manual-pool".to_string(), String::new(), Some(policy))
        .await
        .unwrap();
    let e1 = register(&db, "alpha", "h1").await;
    let e2 = register(&db, "beta", "h2").await;
    pool_manager::assign_endpoint(&db, pool.id, e1.id).await.unwrap();
    pool_manager::assign_endpoint(&db, pool.id, e2.id).await.unwrap();

    state
        .save_snapshot(
            e1.id,
            SystemStateReport {
                pacman_version: "6.0.1".to_string(),
                architecture: "x86_64".to_string(),
                packages: vec![pkg("mypkg", "2.0")],
            },
        )
        .await
        .unwrap();
    coordinator.set_as_latest(e1.id).await.unwrap();

    state
        .save_snapshot(
            e2.id,
            SystemStateReport {
                pacman_version: "6.0.1".to_string(),
                architecture: "x86_64".to_string(),
                packages: vec![pkg("mypkg", "1.0")],
            },
        )
        .await
        .unwrap();

    let sync_op = coordinator.sync_to_latest(e2.id).await.unwrap();
    let op = wait_for_terminal(&coordinator, sync_op).await;
    assert_eq!(op.status, OperationStatus::Failed);
    assert!(op
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("manual resolution"));

    let e2_after = endpoints::get(&db, e2.id).await.unwrap().unwrap();
    assert_eq!(e2_after.sync_status, SyncStatus::Behind);
}

// Packages installed locally but absent from the pool's target snapshot
// are flagged for removal and handed to the mutator, not silently kept.
#[tokio::test]
async fn sync_to_latest_removes_packages_absent_from_target() {
    let db = embedded_db().await;
    let state = StateManager::new(db.clone());
    let coordinator = Coordinator::new(db.clone(), state.clone(), Arc::new(SimulatedMutator));

    let mut policy = SyncPolicy::default();
    policy.conflict_resolution = ConflictResolution::Newest;
    let pool = pool_manager::create_pool(&db, "prune".to_string(), String::new(), Some(policy))
        .await
        .unwrap();

    let e1 = register(&db, "alpha", "h1").await;
    let e2 = register(&db, "beta", "h2").await;
    pool_manager::assign_endpoint(&db, pool.id, e1.id).await.unwrap();
    pool_manager::assign_endpoint(&db, pool.id, e2.id).await.unwrap();

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
    coordinator.set_as_latest(e1.id).await.unwrap();

    // e2 has an extra package ("stray") that the pool's target doesn't.
    state
        .save_snapshot(
            e2.id,
            SystemStateReport {
                pacman_version: "6.0.1".to_string(),
                architecture: "x86_64".to_string(),
                packages: vec![pkg("gcc", "11.2.0"), pkg("stray", "1.0")],
            },
        )
        .await
        .unwrap();

    let sync_op = coordinator.sync_to_latest(e2.id).await.unwrap();
    let op = wait_for_terminal(&coordinator, sync_op).await;
    assert_eq!(op.status, OperationStatus::Completed);

    let e2_final = endpoints::get(&db, e2.id).await.unwrap().unwrap();
    assert_eq!(e2_final.sync_status, SyncStatus::InSync);
}

// S4 — reverting with no prior history is rejected without creating a row.
#[tokio::test]
async fn s4_revert_without_history_is_rejected() {
    let db = embedded_db().await;
    let state = StateManager::new(db.clone());
    let coordinator = Coordinator::new(db.clone(), state.clone(), Arc::new(SimulatedMutator));

    let pool = pool_manager::create_pool(&db, "prod".to_string(), String::new(), None)
        .await
        .unwrap();
    let e1 = register(&db, "alpha", "h1").await;
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

    let before_count = coordinator.list_endpoint_operations(e1.id).await.unwrap().len();
    let result = coordinator.revert_to_previous(e1.id).await;
    assert!(result.is_err());
    let after_count = coordinator.list_endpoint_operations(e1.id).await.unwrap().len();
    assert_eq!(before_count, after_count);
}
