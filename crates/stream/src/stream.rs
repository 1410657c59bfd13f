//! `Stream` (spec.md §4.4) — per-turn pub/sub: a ring buffer of published
//! events, an atomic finished flag, a broadcast channel fanning out to
//! subscribers, and a cancellation token for the owning work task.
//!
//! Grounded on the teacher's `RunStore` broadcast-per-id pattern
//! (`crates/gateway/src/runtime/runs.rs::subscribe`/`emit`), reshaped from
//! a flat per-run channel into a dedicated per-turn object so the ring
//! buffer and `PersistAndClear` atomicity (§4.4) have somewhere to live;
//! the teacher has no equivalent of the ring buffer or persist-then-trim
//! because it doesn't need mid-turn catchup replay.

use std::future::Future;

use tokio::sync::{broadcast, Mutex};
use turnengine_domain::error::Result;
use turnengine_domain::sse_event::SseEvent;

use crate::cancel::CancelToken;
use crate::catchup::IndexedEvent;

const RING_CAPACITY_HINT: usize = 64;
const BROADCAST_CAPACITY: usize = 256;

struct StreamInner {
    /// Events published since the last successful `persist_and_clear`.
    ring: Vec<IndexedEvent>,
    next_seq: u64,
}

/// Per-turn publish/subscribe channel plus ring buffer.
pub struct Stream {
    turn_id: uuid::Uuid,
    debug_mode: bool,
    finished: std::sync::atomic::AtomicBool,
    inner: Mutex<StreamInner>,
    tx: broadcast::Sender<IndexedEvent>,
    cancel: CancelToken,
}

impl Stream {
    pub fn new(turn_id: uuid::Uuid, debug_mode: bool) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            turn_id,
            debug_mode,
            finished: std::sync::atomic::AtomicBool::new(false),
            inner: Mutex::new(StreamInner {
                ring: Vec::with_capacity(RING_CAPACITY_HINT),
                next_seq: 0,
            }),
            tx,
            cancel: CancelToken::new(),
        }
    }

    pub fn turn_id(&self) -> uuid::Uuid {
        self.turn_id
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Publish one event to the ring and to all live subscribers (§4.4
    /// "Publish ordering... single-writer"). Assigns a monotonic
    /// `event-<n>` id only when debug mode is enabled (§4.4 "Event IDs").
    pub async fn publish(&self, event: SseEvent) {
        let terminal = event.is_terminal();
        let mut inner = self.inner.lock().await;
        let id = if self.debug_mode {
            Some(format!("event-{}", inner.next_seq))
        } else {
            None
        };
        inner.next_seq += 1;
        let indexed = IndexedEvent { id, event };
        inner.ring.push(indexed.clone());
        drop(inner);

        // No receivers is not an error — a turn can run with nobody
        // currently connected; catchup covers late subscribers.
        let _ = self.tx.send(indexed);

        if terminal {
            self.finished.store(true, std::sync::atomic::Ordering::Release);
        }
    }

    /// Attach a new subscriber: a snapshot of everything still in the
    /// ring, plus a receiver for everything published from this instant
    /// on. Both are taken under the same lock acquisition so no event can
    /// publish in the gap between snapshot and subscribe (§5 "Concurrent
    /// publish + attach is linearized so that no subscriber misses an
    /// event between its attach and its first receive").
    pub async fn attach(&self) -> (Vec<IndexedEvent>, broadcast::Receiver<IndexedEvent>) {
        let inner = self.inner.lock().await;
        let snapshot = inner.ring.clone();
        let rx = self.tx.subscribe();
        (snapshot, rx)
    }

    /// Runs `persist_fn` to completion, then truncates the ring — but only
    /// on success (§4.4 `PersistAndClear`: "on success, truncate... On
    /// callback error, do not truncate"). Holding the lock across the
    /// callback is the atomicity guarantee: no publish can interleave
    /// while the persist callback is in flight.
    pub async fn persist_and_clear<F, Fut>(&self, persist_fn: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut inner = self.inner.lock().await;
        persist_fn().await?;
        inner.ring.clear();
        Ok(())
    }
}
