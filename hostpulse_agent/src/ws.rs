//! WebSocket upgrade and per-connection handler.
//!
//! One writer task owns the socket sink and drains the connection's queue, so
//! broadcasts and heartbeat frames never interleave mid-frame. The handler
//! itself runs the heartbeat on the inbound half and ends the session as soon
//! as either side fails.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};

use crate::heartbeat::{run_heartbeat, HeartbeatEnd};
use crate::metrics::collect_snapshot;
use crate::registry::{ConnectionHandle, DEFAULT_SEND_TIMEOUT, QUEUE_CAPACITY};
use crate::state::AppState;
use crate::types::MetricsEvent;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Current state for a viewer that just connected: the cached event, or a
/// fresh snapshot on cold start before the first tick.
async fn initial_frame(state: &AppState) -> Option<String> {
    let cached = state.last_json.read().await.clone();
    if !cached.is_empty() {
        return Some(cached);
    }
    match collect_snapshot(&state.provider, &state.config.thresholds).await {
        Ok(snap) => serde_json::to_string(&MetricsEvent::new(snap, Utc::now())).ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Initial snapshot failed");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    serve_viewer(sink, stream, state).await;
}

/// Run one viewer session over an already split socket until the viewer
/// leaves or a send on either path fails.
pub async fn serve_viewer<Si, St, E>(mut sink: Si, stream: St, state: AppState)
where
    Si: Sink<Message> + Unpin + Send + 'static,
    St: Stream<Item = Result<Message, E>> + Send,
{
    let (handle, mut outbox) = ConnectionHandle::channel(QUEUE_CAPACITY);
    let id = handle.id();
    tracing::info!(conn = %id, "Viewer connected");

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                tracing::debug!(conn = %id, "WebSocket sink closed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    if let Some(frame) = initial_frame(&state).await {
        if let Err(e) = handle.deliver(frame, DEFAULT_SEND_TIMEOUT).await {
            tracing::debug!(conn = %id, error = %e, "Initial frame not delivered");
        }
    }
    state.registry.register(handle.clone()).await;

    // Any frame counts as activity; only text can carry the ping token.
    let inbound = Box::pin(
        stream
            .take_while(|m| future::ready(matches!(m, Ok(msg) if !matches!(msg, Message::Close(_)))))
            .map(|m| match m {
                Ok(Message::Text(t)) => t,
                _ => String::new(),
            }),
    );

    // The writer only finishes early when the sink fails.
    let end = tokio::select! {
        end = run_heartbeat(
            inbound,
            handle,
            state.config.heartbeat_interval,
            DEFAULT_SEND_TIMEOUT,
        ) => Some(end),
        _ = &mut writer => None,
    };

    state.registry.unregister(id).await;
    writer.abort();
    match end {
        Some(HeartbeatEnd::ViewerClosed) => tracing::info!(conn = %id, "Viewer disconnected"),
        Some(HeartbeatEnd::SendFailed(e)) => {
            tracing::info!(conn = %id, error = %e, "Viewer dropped after failed heartbeat")
        }
        None => tracing::info!(conn = %id, "Viewer dropped after socket write failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ProviderError;
    use crate::metrics::MetricsProvider;
    use crate::registry::ConnectionRegistry;
    use crate::store::SampleStore;
    use crate::types::Readings;
    use futures::channel::mpsc as fmpsc;
    use std::sync::Arc;
    use std::time::Duration;

    struct NoReadings;

    impl MetricsProvider for NoReadings {
        fn read(&self) -> Result<Readings, ProviderError> {
            Err(ProviderError::Unavailable("not used".into()))
        }
    }

    fn state() -> AppState {
        AppState::new(
            Arc::new(Config::default()),
            Arc::new(NoReadings),
            SampleStore::open_in_memory().unwrap(),
            Arc::new(ConnectionRegistry::new()),
        )
    }

    #[tokio::test]
    async fn dead_sink_unregisters_without_waiting_for_heartbeat() {
        let state = state();
        *state.last_json.write().await = "{}".to_string();

        // receiver gone: the first write fails
        let (sink, sink_rx) = fmpsc::channel::<Message>(1);
        drop(sink_rx);
        // viewer stays silent and never closes
        let (_in_tx, inbound) = fmpsc::unbounded::<Result<Message, axum::Error>>();

        // heartbeat interval is 30s, so only the writer can end this session
        tokio::time::timeout(
            Duration::from_secs(5),
            serve_viewer(sink, inbound, state.clone()),
        )
        .await
        .expect("session ended on write failure");
        assert_eq!(state.registry.count().await, 0);
    }

    #[tokio::test]
    async fn session_ends_when_viewer_stream_closes() {
        let state = state();
        let (sink, _sink_rx) = fmpsc::channel::<Message>(8);
        let (in_tx, inbound) = fmpsc::unbounded::<Result<Message, axum::Error>>();
        drop(in_tx);

        tokio::time::timeout(Duration::from_secs(5), serve_viewer(sink, inbound, state.clone()))
            .await
            .expect("session ended on close");
        assert_eq!(state.registry.count().await, 0);
    }
}
