use super::AppState;
use crate::store::ObservationQuery;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

/// GET /ws/weather
///
/// Any text frame from any client publishes the newest observation, as a
/// JSON array, to every connected client.
pub async fn weather_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let (mut outbound, mut inbound) = socket.split();
    let mut updates = state.updates.subscribe();
    tracing::debug!(subscribers = state.updates.receiver_count(), "WebSocket connected");

    loop {
        tokio::select! {
            frame = inbound.next() => match frame {
                Some(Ok(Message::Text(_))) => publish_latest(&state).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "WebSocket receive failed");
                    break;
                }
            },
            update = updates.recv() => match update {
                Ok(payload) => {
                    if outbound.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "WebSocket subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::debug!("WebSocket disconnected");
}

async fn publish_latest(state: &AppState) {
    let rows = match state.store.latest(Some(1)).await {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(error = %err, "Latest observation lookup failed");
            return;
        }
    };

    match serde_json::to_string(&rows) {
        // No subscribers is not an error
        Ok(payload) => {
            let _ = state.updates.send(payload);
        }
        Err(err) => tracing::warn!(error = %err, "Failed to encode WebSocket payload"),
    }
}
