//! Server-Sent Events (SSE) handler.
//!
//! Subscribes to the [`mf_core::events::EventBus`], optionally filters by
//! job, replays recent events for late joiners, and sends heartbeats.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;

use mf_core::JobId;

use crate::context::AppContext;

/// Optional query parameter restricting the stream to one job.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct EventsQuery {
    #[param(value_type = Option<String>)]
    pub job_id: Option<JobId>,
}

/// GET /api/events -- SSE stream of job events.
#[utoipa::path(
    get,
    path = "/api/events",
    params(EventsQuery),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream")
    )
)]
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<EventsQuery>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let job_filter = params.job_id;

    // Subscribe before reading the backlog so nothing falls in between.
    let mut rx = ctx.event_bus.subscribe();
    let recent = ctx.event_bus.recent_events(50);

    let stream = async_stream::stream! {
        for event in recent.into_iter().rev() {
            if matches_job(event.payload.job_id(), job_filter) {
                if let Ok(data) = serde_json::to_string(&event) {
                    yield Ok(Event::default().data(data));
                }
            }
        }

        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if matches_job(event.payload.job_id(), job_filter) {
                                if let Ok(data) = serde_json::to_string(&event) {
                                    yield Ok(Event::default().data(data));
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!("SSE client lagged by {n} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
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

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn matches_job(event_job: JobId, filter: Option<JobId>) -> bool {
    filter.map_or(true, |id| id == event_job)
}
