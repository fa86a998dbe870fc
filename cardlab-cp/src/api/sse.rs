//! Server-Sent Events (SSE) for narrated batch progress.
//!
//! Subscribers get the session's full event log from the beginning, then
//! live events as the pipeline narrates them. Sequence numbers stitch the
//! replayed log and the live feed together without duplicates, and let a
//! lagged subscriber resync from the log instead of missing events. The
//! stream ends after the session's completion event.

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use cardlab_common::events::{NarratedEvent, StepKind};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /batch/events/:session_id - SSE stream of narrated events
pub async fn event_stream(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if !state.sessions.exists(session_id).await {
        return Err(ApiError::NotFound(format!("No session {}", session_id)));
    }

    info!(session_id = %session_id, "New SSE client connected");

    // Subscribe before replaying the log so no event can fall in the gap.
    let mut rx = state.event_bus.subscribe();
    let sessions = state.sessions.clone();

    let stream = async_stream::stream! {
        let mut next_seq: u64 = 0;
        let mut done = false;

        if let Some(events) = sessions.events_from(session_id, 0).await {
            for event in events {
                next_seq = event.seq + 1;
                if event.kind == StepKind::Complete {
                    done = true;
                }
                if let Some(sse_event) = to_sse_event(&event) {
                    yield Ok(sse_event);
                }
            }
        }

        while !done {
            tokio::select! {
                // Heartbeat every 15 seconds
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!(session_id = %session_id, "SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => match received {
                    Ok(wrapped) if wrapped.session_id == session_id => {
                        // Anything below next_seq was already replayed
                        if wrapped.event.seq >= next_seq {
                            next_seq = wrapped.event.seq + 1;
                            if wrapped.event.kind == StepKind::Complete {
                                done = true;
                            }
                            if let Some(sse_event) = to_sse_event(&wrapped.event) {
                                yield Ok(sse_event);
                            }
                        }
                    }
                    Ok(_) => {
                        // Different session's event
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session_id = %session_id, skipped, "SSE client lagged; resyncing from log");
                        match sessions.events_from(session_id, next_seq).await {
                            Some(events) => {
                                for event in events {
                                    next_seq = event.seq + 1;
                                    if event.kind == StepKind::Complete {
                                        done = true;
                                    }
                                    if let Some(sse_event) = to_sse_event(&event) {
                                        yield Ok(sse_event);
                                    }
                                }
                            }
                            None => break,
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }

        debug!(session_id = %session_id, "SSE: stream finished");
    };

    Ok(Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

fn to_sse_event(event: &NarratedEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.kind.as_str()).data(json)),
        Err(e) => {
            warn!(seq = event.seq, "SSE: Failed to serialize event: {}", e);
            None
        }
    }
}
