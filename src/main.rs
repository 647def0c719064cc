use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use geostamp_ocr::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::ocr::WorkersAiFactory,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing geostamp-ocr server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("ocr_jobs_submitted_total", "Recognition jobs submitted to the pool");
    metrics::describe_counter!("ocr_jobs_completed_total", "Recognition jobs that returned text");
    metrics::describe_counter!("ocr_jobs_failed_total", "Recognition jobs that failed");
    metrics::describe_histogram!("ocr_recognition_seconds", "Time spent in one recognition call");
    metrics::describe_gauge!("ocr_pool_engines", "Engines in the recognition pool");

    // Engines are created on the first batch, not here
    let factory = Arc::new(WorkersAiFactory {
        account_id: config.cf_account_id.clone(),
        api_token: config.cf_api_token.clone(),
        model: config.ocr_model.clone(),
    });
    let state = AppState::new(&config, factory);

    tracing::info!(
        pool_size = config.ocr_pool_size,
        model = %config.ocr_model,
        language = %config.ocr_language,
        job_timeout_secs = ?config.ocr_job_timeout_secs,
        "Recognition pool configured"
    );

    let app = routes::api_router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting geostamp-ocr on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
