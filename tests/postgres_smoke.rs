use poolsyncd::db::{migrations, Db, DbKind};
use poolsyncd::model::{PackageRecord, SystemStateReport};
use poolsyncd::{endpoints, pool_manager, state_manager::StateManager};

fn pkg(name: &str, version: &str) -> PackageRecord {
    PackageRecord {
        name: name.to_string(),
        version: version.to_string(),
        repository: "core".to_string(),
        installed_size: 0,
        dependencies: vec![],
    }
}

// Exercises the same `?`-placeholder SQL against the server-grade engine.
// Requires a real reachable Postgres instance; run locally against a
// disposable database via `DATABASE_URL=postgres://... cargo test -- --ignored`.
#[tokio::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn pools_and_snapshots_round_trip_through_postgres() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a Postgres server");
    let db = Db::connect(DbKind::Server, &url, 1, 5).await.unwrap();
    migrations::run(&db).await.unwrap();

    let pool = pool_manager::create_pool(&db, "pg-smoke".to_string(), String::new(), None)
        .await
        .unwrap();
    let endpoint = endpoints::register(
        &db,
        endpoints::RegisterRequest {
            name: "pg-alpha".to_string(),
            hostname: "pg-h1".to_string(),
        },
    )
    .await
    .unwrap()
    .endpoint;
    pool_manager::assign_endpoint(&db, pool.id, endpoint.id).await.unwrap();

    let state = StateManager::new(db.clone());
    let snapshot_id = state
        .save_snapshot(
            endpoint.id,
            SystemStateReport {
                pacman_version: "6.0.1".to_string(),
                architecture: "x86_64".to_string(),
                packages: vec![pkg("gcc", "11.2.0")],
            },
        )
        .await
        .unwrap();

    let fetched = state.get_snapshot(snapshot_id).await.unwrap().unwrap();
    assert_eq!(fetched.packages, vec![pkg("gcc", "11.2.0")]);

    let status = pool_manager::pool_status(&db, pool.id).await.unwrap();
    assert_eq!(status.total_endpoints, 1);
}
