//! Server-Sent Events handler.
//!
//! Attaches a notifier observer, sends the current listing first, then relays
//! every notification with a periodic heartbeat.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::Instant;

use crate::notifier::Notification;
use crate::server::AppContext;

const HEARTBEAT: Duration = Duration::from_secs(15);

/// GET /api/events -- SSE stream of job notifications.
pub async fn events_handler(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Attach before reading the snapshot so nothing published in between is lost.
    let mut observer = ctx.notifier.attach();
    let initial = Notification::QueueUpdate {
        queue: ctx.notifier.snapshot().as_ref().clone(),
    };

    let stream = async_stream::stream! {
        if let Some(event) = to_event(&initial) {
            yield Ok(event);
        }

        let mut heartbeat = tokio::time::interval_at(Instant::now() + HEARTBEAT, HEARTBEAT);

        loop {
            tokio::select! {
                next = observer.recv() => {
                    match next {
                        Some(notification) => {
                            if let Some(event) = to_event(&notification) {
                                yield Ok(event);
                            }
                        }
                        None => {
                            tracing::debug!(observer_id = %observer.id(), "SSE observer pruned, closing stream");
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(Event::default()
                        .event("heartbeat")
                        .data(r#"{"type":"heartbeat"}"#));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("ping"))
}

fn to_event(notification: &Notification) -> Option<Event> {
    match serde_json::to_string(notification) {
        Ok(data) => Some(Event::default().event(notification.kind()).data(data)),
        Err(e) => {
            tracing::warn!("Failed to encode {} event: {}", notification.kind(), e);
            None
        }
    }
}
