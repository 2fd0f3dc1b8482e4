use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(sse_handler))
}

pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut events = state.monitor().subscribe();
    let mut shutdown_rx = state.shutdown_rx();
    let status = state.monitor().status().await;

    let stream = async_stream::stream! {
        if let Ok(event) = Event::default().event("status").json_data(&status) {
            yield Ok(event);
        }

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        match Event::default().event(event.name()).json_data(&event) {
                            Ok(sse) => yield Ok(sse),
                            Err(e) => tracing::warn!(error = %e, "Failed to encode monitor event"),
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "SSE subscriber lagging, dropping events");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}
