//! Route table — spec §6.

use crate::{coordinator, endpoints, health, pool_manager, repo_analyzer, ws};
use axum::routing::{get, post, put};
use axum::Router;

pub fn api_routes() -> Router {
    Router::new()
        .route(
            "/api/pools",
            get(pool_manager::handlers::list).post(pool_manager::handlers::create),
        )
        .route(
            "/api/pools/:id",
            get(pool_manager::handlers::get)
                .put(pool_manager::handlers::update)
                .delete(pool_manager::handlers::delete),
        )
        .route("/api/pools/:id/status", get(pool_manager::handlers::status))
        .route(
            "/api/pools/:id/endpoints",
            post(pool_manager::handlers::add_endpoint),
        )
        .route(
            "/api/pools/:id/endpoints/:endpoint_id",
            axum::routing::delete(pool_manager::handlers::remove_endpoint_route),
        )
        .route(
            "/api/pools/:id/endpoints/:endpoint_id/move/:to_pool_id",
            put(pool_manager::handlers::move_endpoint),
        )
        .route(
            "/api/repositories/analysis/:pool_id",
            get(repo_analyzer::handlers::analysis),
        )
        .route("/api/endpoints/register", post(endpoints::handlers::register))
        .route("/api/endpoints", get(endpoints::handlers::list))
        .route(
            "/api/endpoints/:id",
            get(endpoints::handlers::get).delete(endpoints::handlers::delete),
        )
        .route("/api/endpoints/:id/status", put(endpoints::handlers::heartbeat))
        .route(
            "/api/endpoints/:id/repositories",
            get(endpoints::handlers::list_repositories).post(endpoints::handlers::push_repositories),
        )
        .route("/api/endpoints/:id/state", post(endpoints::handlers::save_state))
        .route("/api/endpoints/:id/state/history", get(endpoints::handlers::state_history))
        .route("/api/endpoints/:id/operations", get(endpoints::handlers::operations))
        .route("/api/endpoints/:id/sync", post(endpoints::handlers::sync_to_latest))
        .route("/api/endpoints/:id/set-latest", post(endpoints::handlers::set_as_latest))
        .route("/api/endpoints/:id/revert", post(endpoints::handlers::revert_to_previous))
        .route(
            "/api/operations/:id",
            get(coordinator::handlers::get).delete(coordinator::handlers::cancel),
        )
        .route("/ws/operations", get(ws::operations_ws))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/health/detailed", get(health::detailed))
}
