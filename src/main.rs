use poolsyncd::coordinator::Coordinator;
use poolsyncd::db::{migrations, Db, DbKind};
use poolsyncd::mutator::SimulatedMutator;
use poolsyncd::state_manager::StateManager;
use poolsyncd::{config, routes};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_new(config::LOGGING_LEVEL.as_str())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if *config::LOGGING_STRUCTURED {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    // Fail fast if the signing secret is missing.
    let _ = config::AUTH_TOKEN_SIGNING_SECRET.as_str();

    let kind = DbKind::parse(config::DATABASE_KIND.as_str());
    let db = Db::connect(
        kind,
        config::DATABASE_URL.as_str(),
        *config::DATABASE_POOL_MIN_SIZE,
        *config::DATABASE_POOL_MAX_SIZE,
    )
    .await?;
    migrations::run(&db).await?;

    let state_manager = StateManager::new(db.clone());
    let coordinator = Coordinator::new(db.clone(), state_manager.clone(), Arc::new(SimulatedMutator));

    let recovered = coordinator.recover_on_startup().await?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "recovered interrupted operations as failed on startup");
    }

    let heartbeat_coordinator = coordinator.clone();
    let sweep_interval = (*config::HEARTBEAT_OFFLINE_THRESHOLD_SECONDS / 3).clamp(1, 30);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval));
        loop {
            ticker.tick().await;
            match heartbeat_coordinator
                .sweep_heartbeats(*config::HEARTBEAT_OFFLINE_THRESHOLD_SECONDS as i64)
                .await
            {
                Ok(count) if count > 0 => tracing::info!(count, "marked endpoints offline"),
                Ok(_) => {}
                Err(err) => tracing::error!(?err, "heartbeat sweep failed"),
            }
        }
    });

    let cors = if config::CORS_ALLOWED_ORIGINS.is_empty() {
        CorsLayer::new().allow_origin(AllowOrigin::any())
    } else {
        let origins: Vec<_> = config::CORS_ALLOWED_ORIGINS
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    let app = routes::api_routes()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::Extension(db))
        .layer(axum::Extension(state_manager))
        .layer(axum::Extension(coordinator));

    let addr: SocketAddr = format!("{}:{}", config::SERVER_HOST.as_str(), *config::SERVER_PORT).parse()?;
    tracing::info!(%addr, "listening for incoming connections");

    let server = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    let drain_timeout = Duration::from_secs(*config::SHUTDOWN_GRACEFUL_TIMEOUT_SECONDS);
    match tokio::time::timeout(drain_timeout, server).await {
        Ok(result) => result?,
        Err(_) => tracing::warn!("graceful shutdown timed out, dropping remaining connections"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    poolsyncd::coordinator::begin_shutdown();
    tracing::info!(
        timeout_seconds = *config::SHUTDOWN_GRACEFUL_TIMEOUT_SECONDS,
        "shutdown signal received, rejecting new operations and draining connections"
    );
}
