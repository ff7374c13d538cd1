use super::{observe, AppState};
use crate::alerts::Alert;
use crate::error::AppError;
use crate::metrics;
use crate::observation::Observation;
use crate::store::ObservationStore;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub received: usize,
    pub stored: usize,
    pub dropped: usize,
}

/// POST /api/observations
///
/// Implausible readings are dropped before the batch reaches the store; the
/// rest are appended in one call.
pub async fn ingest_observations(
    State(state): State<AppState>,
    Json(batch): Json<Vec<Observation>>,
) -> Result<Json<IngestSummary>, AppError> {
    let received = batch.len();
    let (kept, rejected): (Vec<Observation>, Vec<Observation>) =
        batch.into_iter().partition(Observation::is_plausible);
    let dropped = rejected.len();

    if dropped > 0 {
        metrics::record_dropped(dropped);
        state
            .alerts
            .notify(Alert::RecordsDropped { dropped, received })
            .await;
    }

    let stored = match observe("append_batch", state.store.append_batch(&kept)).await {
        Ok(stored) => stored,
        Err(err) => {
            let reason = match &err {
                AppError::Storage(storage) => storage.kind().to_string(),
                other => other.to_string(),
            };
            state
                .alerts
                .notify(Alert::AppendFailed {
                    records: kept.len(),
                    reason,
                })
                .await;
            return Err(err);
        }
    };

    metrics::record_stored(&state.store.backend().to_string(), stored);
    tracing::info!(received, stored, dropped, "Observation batch ingested");

    Ok(Json(IngestSummary {
        received,
        stored,
        dropped,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::testing::RecordingSink;
    use crate::config::StorageConfig;
    use crate::observation::ObservedAt;
    use crate::store::{ObservationQuery, ObservationStore, SqliteStore};
    use std::sync::Arc;

    fn obs(district: &str, temp: f64) -> Observation {
        let at = ObservedAt::parse("2024-01-01T10:00").unwrap();
        Observation::new(district, at, temp, 50.0, 3.0)
    }

    #[tokio::test]
    async fn test_implausible_records_are_dropped_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            sqlite_path: dir.path().join("weather.db"),
            ..Default::default()
        };
        let store = SqliteStore::connect(&config).await.unwrap();
        store.initialize().await.unwrap();
        let store = Arc::new(store);
        let sink = Arc::new(RecordingSink::default());
        let state = AppState::new(store.clone(), sink.clone());

        let Json(summary) = ingest_observations(
            State(state),
            Json(vec![obs("A", 20.0), obs("B", 500.0), obs("C", 21.0)]),
        )
        .await
        .unwrap();

        assert_eq!(
            summary,
            IngestSummary {
                received: 3,
                stored: 2,
                dropped: 1
            }
        );
        assert_eq!(store.latest(None).await.unwrap().len(), 2);
        assert_eq!(
            sink.alerts.lock().unwrap().as_slice(),
            &[Alert::RecordsDropped { dropped: 1, received: 3 }]
        );
    }

    #[tokio::test]
    async fn test_failed_append_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            sqlite_path: dir.path().join("weather.db"),
            ..Default::default()
        };
        // No initialize(), so the table is missing
        let store = Arc::new(SqliteStore::connect(&config).await.unwrap());
        let sink = Arc::new(RecordingSink::default());
        let state = AppState::new(store, sink.clone());

        let result = ingest_observations(State(state), Json(vec![obs("A", 20.0)])).await;
        assert!(matches!(result, Err(AppError::Storage(_))));

        let alerts = sink.alerts.lock().unwrap();
        assert_eq!(
            alerts.as_slice(),
            &[Alert::AppendFailed {
                records: 1,
                reason: "schema".to_string()
            }]
        );
    }
}
