//! Server-Sent Events endpoint for watch-mode reload notifications

use crate::server::SharedState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// SSE handler — streams reload notifications to the harness page.
pub async fn reload_handler(
    State(app): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut reloads = app.reload_tx.subscribe();

    let stream = async_stream::stream! {
        loop {
            match reloads.recv().await {
                Ok(reload) => {
                    yield Ok(Event::default()
                        .event("reload")
                        .data(reload.path.display().to_string()));
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("reload stream lagged by {skipped} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
