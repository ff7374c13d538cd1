use anyhow::Result;
use axum::{extract::DefaultBodyLimit, middleware, routing::{get, post}, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    alerts::TracingAlertSink,
    auth::{self, ApiKeys},
    config::Config,
    handlers::{self, AppState},
    metrics,
    rate_limit::{self, RateLimiter},
    signals::setup_signal_handlers,
    store::{self, ObservationStore},
};

/// Largest accepted request body (ingest batches)
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Start the weather service
///
/// This function:
/// 1. Initializes metrics
/// 2. Connects the configured store and ensures its schema
/// 3. Builds the rate limiter
/// 4. Binds to the configured address
/// 5. Serves requests with graceful shutdown support
pub async fn start_server(config: Config) -> Result<()> {
    let metrics_handle = if config.metrics.enabled {
        info!("Initializing Prometheus metrics...");
        Some(Arc::new(metrics::init_metrics()?))
    } else {
        None
    };

    let store = store::connect(&config.storage).await?;
    store.initialize().await?;
    metrics::record_service_info(&store.backend().to_string());
    info!(backend = %store.backend(), "Observation store ready");

    let limiter = RateLimiter::from_config(&config.rate_limit).await?;

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let state = AppState::new(store, Arc::new(TracingAlertSink));
    let app = create_router(&config, state, limiter, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting weather service on {}", addr);
    info!(
        "Configuration: {} backend, rate limit {}, {} API keys",
        config.storage.backend,
        if config.rate_limit.enabled {
            config.rate_limit.strategy.to_string()
        } else {
            "disabled".to_string()
        },
        config.auth.api_keys.len()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, draining connections...");
    })
    .await?;

    signal_handle.abort();
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(
    config: &Config,
    state: AppState,
    limiter: Option<RateLimiter>,
    metrics_handle: Option<Arc<PrometheusHandle>>,
) -> Router {
    let mut api_routes = Router::new()
        .route("/api/latest-data", get(handlers::weather::latest_data))
        .route("/api/by-district", get(handlers::weather::by_district))
        .route("/api/data-range", get(handlers::weather::data_range))
        .route("/api/hourly-average", get(handlers::weather::hourly_average))
        .route("/api/statistics", get(handlers::weather::statistics))
        .route(
            "/api/observations",
            post(handlers::ingest::ingest_observations),
        )
        .route("/ws/weather", get(handlers::ws::weather_socket))
        .with_state(state);

    if !config.auth.api_keys.is_empty() {
        api_routes = api_routes.layer(middleware::from_fn_with_state(
            ApiKeys::new(config.auth.api_keys.iter().cloned()),
            auth::auth_middleware,
        ));
    }

    let mut app = Router::new().route("/health", get(handlers::health::health_check));

    if let Some(handle) = metrics_handle {
        app = app.merge(
            Router::new()
                .route("/metrics", get(handlers::metrics_handler::metrics))
                .with_state(handle),
        );
    }

    let mut app = app
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    if let Some(limiter) = limiter {
        app = app.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::middleware::enforce,
        ));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ObservationStore, SqliteStore};
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    async fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.sqlite_path = dir.path().join("weather.db");
        let store = SqliteStore::connect(&config.storage).await.unwrap();
        store.initialize().await.unwrap();
        (AppState::new(Arc::new(store), Arc::new(TracingAlertSink)), dir)
    }

    #[tokio::test]
    async fn test_create_router() {
        let (state, _dir) = test_state().await;
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let app = create_router(&Config::default(), state, None, Some(Arc::new(recorder.handle())));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_route_absent_when_disabled() {
        let (state, _dir) = test_state().await;
        let app = create_router(&Config::default(), state, None, None);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_keys_guard_api_but_not_health() {
        let (state, _dir) = test_state().await;
        let mut config = Config::default();
        config.auth.api_keys = vec!["k-1".to_string()];
        let app = create_router(&config, state, None, None);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/statistics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/statistics")
                    .header(auth::API_KEY_HEADER, "k-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
