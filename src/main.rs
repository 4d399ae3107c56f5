use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use videx_estimator::config::Config;
use videx_estimator::handlers::{self, AppState};
use videx_estimator::services::estimator::{EstimatorStrategy, InnoDbLikeEstimator};
use videx_estimator::services::task_registry::TaskRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    // held for the process lifetime: dropping it stops the non-blocking file writer
    let _log_guard = if let Some(log_dir) = &config.logging.directory {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::daily(log_dir, "videx-server.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
        Some(guard)
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        None
    };

    tracing::info!("videx-server starting up");
    tracing::info!("configuration loaded successfully");

    let task_registry = Arc::new(TaskRegistry::new(config.limits.max_decompressed_payload_bytes));
    let estimator: Arc<dyn EstimatorStrategy> = Arc::new(InnoDbLikeEstimator);

    let app_state = AppState { registry: task_registry, estimator };

    let app = Router::new()
        .route("/create_task_meta", post(handlers::task::create_task_meta))
        .route("/ask_videx", post(handlers::ask::ask_videx))
        .route("/videx/visualization/get_stats", get(handlers::visualization::get_stats))
        .route("/health", get(handlers::health::health))
        .with_state(app_state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
