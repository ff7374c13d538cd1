pub mod health;
pub mod ingest;
pub mod metrics_handler;
pub mod weather;
pub mod ws;

use crate::{alerts::AlertSink, error::AppError, metrics, store::StorageError, store::WeatherStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Messages buffered per WebSocket subscriber before it starts lagging
pub const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// State shared by the API and WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WeatherStore>,
    pub alerts: Arc<dyn AlertSink>,
    /// Fan-out of JSON payloads to every connected WebSocket
    pub updates: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn WeatherStore>, alerts: Arc<dyn AlertSink>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            store,
            alerts,
            updates,
        }
    }
}

/// Await a store call, recording its duration and any failure.
pub(crate) async fn observe<T, F>(operation: &'static str, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    let started = Instant::now();
    let result = call.await;
    metrics::record_query_duration(operation, started.elapsed());

    result.map_err(|err| {
        metrics::record_storage_error(operation, err.kind());
        AppError::from(err)
    })
}
