//! Anomaly event streaming handler

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};

use crate::events::ANOMALY_DETECTED;
use crate::AppState;

/// Stream newly created anomalies via SSE. Each subscriber receives every
/// payload published after it attaches; history is not replayed.
pub async fn stream_anomalies(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(payload) => {
                let json = serde_json::to_string(&payload).unwrap_or_default();
                let sse_event = Event::default().event(ANOMALY_DETECTED).data(json);
                Some((Ok(sse_event), rx))
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                // Client lagged behind, continue
                Some((Ok(Event::default().comment(format!("lagged {}", skipped))), rx))
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => None,
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
