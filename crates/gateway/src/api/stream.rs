//! `GET /api/turns/{id}/stream` (spec.md §4.5, §6).
//!
//! Grounded on the teacher's `run_events_sse`/`make_run_event_stream`
//! (`crates/gateway/src/api/runs.rs`): terminal-turn snapshot-and-close,
//! live subscribe via `async_stream::stream!`, `Lagged`/`Closed`
//! broadcast-error handling. Reshaped around two things the teacher's
//! single always-live channel didn't need: a `Last-Event-ID` catchup
//! replay built straight from storage (`CatchupBuilder`, §4.5), and
//! stitching that replay together with the in-memory ring still sitting
//! in the live `Stream` so a reconnecting client misses nothing between
//! "last persisted block" and "now" (§4.4 `PersistAndClear`).

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::stream::Stream;
use tokio::sync::broadcast;

use turnengine_stream::{CatchupBuilder, IndexedEvent};

use crate::state::AppState;

const LAST_EVENT_ID_HEADER: &str = "last-event-id";

pub async fn stream_turn(State(state): State<AppState>, Path(turn_id): Path<uuid::Uuid>, headers: HeaderMap) -> impl IntoResponse {
    let last_event_id = headers.get(LAST_EVENT_ID_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string);

    let turn = match state.reader.get_turn(turn_id).await {
        Ok(turn) => turn,
        Err(_) => return closed_stream(once_event("error", r#"{"error":"turn not found"}"#)),
    };

    let catchup_builder = CatchupBuilder::new(state.reader.clone());

    // A terminated turn never gets live events again (§4.5 step 5):
    // replay what's persisted and close. The client reads
    // `Turn.status`/`Turn.error` for the final outcome.
    if turn.is_terminal() {
        let events = catchup_builder.build(turn_id, last_event_id.as_deref()).await.unwrap_or_default();
        return finite_stream(events);
    }

    let live = state.streams.get(turn_id).filter(|s| !s.is_finished());
    let Some(live_stream) = live else {
        // Turn is still marked in-progress but the live stream has no
        // registry entry (process restart, or retention already swept
        // it) — all we can offer is what's durable.
        let events = catchup_builder.build(turn_id, last_event_id.as_deref()).await.unwrap_or_default();
        return finite_stream(events);
    };

    let catchup_events = match catchup_builder.build(turn_id, last_event_id.as_deref()).await {
        Ok(events) => events,
        Err(_) => Vec::new(),
    };
    // `attach` takes its lock after `catchup_builder.build` reads storage,
    // so anything persisted in between shows up in the ring snapshot
    // instead of being lost. A window of 0 events wide in the worst case,
    // never a gap.
    let (ring_snapshot, rx) = live_stream.attach().await;

    let stream = live_tail_stream(catchup_events, ring_snapshot, rx);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn live_tail_stream(
    catchup: Vec<IndexedEvent>,
    ring: Vec<IndexedEvent>,
    mut rx: broadcast::Receiver<IndexedEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        for indexed in catchup.into_iter().chain(ring) {
            yield Ok(to_sse(&indexed));
        }

        loop {
            match rx.recv().await {
                Ok(indexed) => {
                    let terminal = indexed.event.is_terminal();
                    yield Ok(to_sse(&indexed));
                    if terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    yield Ok(Event::default().event("warning").data(format!("{{\"warning\":\"missed {n} events\"}}")));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

fn finite_stream(events: Vec<IndexedEvent>) -> axum::response::Response {
    let stream = futures_util::stream::iter(events.into_iter().map(|indexed| Ok::<_, std::convert::Infallible>(to_sse(&indexed))));
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn closed_stream(event: Event) -> axum::response::Response {
    let stream = futures_util::stream::once(async move { Ok::<_, std::convert::Infallible>(event) });
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn once_event(name: &'static str, data: &'static str) -> Event {
    Event::default().event(name).data(data)
}

fn to_sse(indexed: &IndexedEvent) -> Event {
    let data = serde_json::to_string(&indexed.event).unwrap_or_default();
    let event = Event::default().event(indexed.event.event_name()).data(data);
    match &indexed.id {
        Some(id) => event.id(id.clone()),
        None => event,
    }
}
