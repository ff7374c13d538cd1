use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and describe every metric.
///
/// Fails if a recorder is already installed in this process.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metric_descriptions();
    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "weather_observations_stored_total",
        "Observations written to the store"
    );
    describe_counter!(
        "weather_observations_dropped_total",
        "Observations rejected by the plausibility filter"
    );
    describe_counter!(
        "weather_storage_errors_total",
        "Storage operations that failed"
    );
    describe_histogram!(
        "weather_query_duration_seconds",
        "Store operation duration in seconds"
    );
    describe_counter!(
        "weather_rate_limited_total",
        "Requests rejected by the rate limiter"
    );
    describe_gauge!(
        "weather_service_info",
        "Service version and storage backend"
    );
}

/// Publish the version and active backend
pub fn record_service_info(backend: &str) {
    gauge!(
        "weather_service_info",
        "version" => env!("CARGO_PKG_VERSION"),
        "backend" => backend.to_string(),
    )
    .set(1.0);
}

pub fn record_stored(backend: &str, count: usize) {
    counter!("weather_observations_stored_total", "backend" => backend.to_string())
        .increment(count as u64);
}

pub fn record_dropped(count: usize) {
    counter!("weather_observations_dropped_total").increment(count as u64);
}

/// Record a failed store operation
pub fn record_storage_error(operation: &'static str, kind: &'static str) {
    counter!(
        "weather_storage_errors_total",
        "operation" => operation,
        "kind" => kind,
    )
    .increment(1);
}

/// Record store operation duration
pub fn record_query_duration(operation: &'static str, duration: Duration) {
    histogram!("weather_query_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}

pub fn record_rate_limited(strategy: &str) {
    counter!("weather_rate_limited_total", "strategy" => strategy.to_string()).increment(1);
}
