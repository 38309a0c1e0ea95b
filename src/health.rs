//! Liveness/readiness/detail probes — spec §4.H.

use crate::db::Db;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

pub async fn live() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(Extension(db): Extension<Db>) -> (StatusCode, Json<serde_json::Value>) {
    match db.health_ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": err.to_string() })),
        ),
    }
}

pub async fn detailed(
    Extension(db): Extension<Db>,
    Extension(coordinator): Extension<crate::coordinator::Coordinator>,
) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = db.health_ping().await.is_ok();
    let pools: i64 = db.fetch_scalar_i64("SELECT COUNT(*) FROM pools").await.unwrap_or(-1);
    let endpoints: i64 = db.fetch_scalar_i64("SELECT COUNT(*) FROM endpoints").await.unwrap_or(-1);
    let offline: i64 = db
        .fetch_scalar_i64("SELECT COUNT(*) FROM endpoints WHERE sync_status = 'offline'")
        .await
        .unwrap_or(-1);
    let active_operations: i64 = db
        .fetch_scalar_i64("SELECT COUNT(*) FROM operations WHERE status IN ('pending', 'in_progress')")
        .await
        .unwrap_or(-1);

    let status = if db_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(json!({
            "status": if db_ok { "healthy" } else { "degraded" },
            "database_kind": db.kind().as_str(),
            "pools": pools,
            "endpoints": endpoints,
            "endpoints_offline": offline,
            "active_operations": active_operations,
            "coordinator_inflight": coordinator.inflight_count(),
            "analyzer_cached_pools": crate::repo_analyzer::cached_count(),
        })),
    )
}
