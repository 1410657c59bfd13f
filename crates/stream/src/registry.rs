//! `StreamRegistry` (spec.md §4.4) — the process-wide `turnId → Stream`
//! map, with a retention sweep and graceful shutdown.
//!
//! Grounded on the teacher's `NodeRegistry`
//! (`crates/gateway/src/nodes/registry.rs`) for the `RwLock<HashMap<..>>`
//! shape, and on `RunStore`'s bounded-ring eviction
//! (`crates/gateway/src/runtime/runs.rs`, `MAX_RUNS_IN_MEMORY`) for the
//! retention idea — generalized here from a count bound to the
//! duration-based window spec.md §4.4 specifies ("After retention expires,
//! the stream is removed").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::stream::Stream;

struct Entry {
    stream: Arc<Stream>,
    /// Set when the stream finishes; retention counts from here.
    finished_at: Option<DateTime<Utc>>,
}

/// Process-wide registry of live and recently-finished streams.
pub struct StreamRegistry {
    entries: RwLock<HashMap<uuid::Uuid, Entry>>,
    retention: Duration,
}

impl StreamRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn register(&self, stream: Arc<Stream>) {
        let turn_id = stream.turn_id();
        self.entries.write().insert(
            turn_id,
            Entry {
                stream,
                finished_at: None,
            },
        );
    }

    pub fn get(&self, turn_id: uuid::Uuid) -> Option<Arc<Stream>> {
        self.entries.read().get(&turn_id).map(|e| e.stream.clone())
    }

    /// Mark a stream as finished so the retention sweep can reclaim it.
    /// Called by the executor once the stream itself reports
    /// [`Stream::is_finished`] (it does not self-report timing to the
    /// registry).
    pub fn mark_finished(&self, turn_id: uuid::Uuid) {
        if let Some(entry) = self.entries.write().get_mut(&turn_id) {
            if entry.finished_at.is_none() {
                entry.finished_at = Some(Utc::now());
            }
        }
    }

    /// Remove every entry whose stream finished more than `retention` ago
    /// (§4.4 "After retention expires, the stream is removed; subsequent
    /// reconnect requests reconstruct state entirely via catchup from the
    /// database"). Intended to be called periodically by a background
    /// task; returns the number of entries evicted.
    pub fn sweep_expired(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.retention).unwrap_or_default();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| match entry.finished_at {
            Some(finished_at) => finished_at > cutoff,
            None => true,
        });
        before - entries.len()
    }

    /// Cancel every live stream and drop them from the registry (§5 "If
    /// the registry is shutdown, each live stream is cancelled").
    pub fn shutdown(&self) {
        let mut entries = self.entries.write();
        for entry in entries.values() {
            entry.stream.cancel_token().cancel();
        }
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn register_then_get_round_trips() {
        let registry = StreamRegistry::new(StdDuration::from_secs(600));
        let turn_id = uuid::Uuid::new_v4();
        let stream = Arc::new(Stream::new(turn_id, false));
        registry.register(stream);

        assert!(registry.get(turn_id).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sweep_leaves_unfinished_and_recently_finished_streams() {
        let registry = StreamRegistry::new(StdDuration::from_secs(600));
        let turn_id = uuid::Uuid::new_v4();
        registry.register(Arc::new(Stream::new(turn_id, false)));
        registry.mark_finished(turn_id);

        let evicted = registry.sweep_expired();
        assert_eq!(evicted, 0);
        assert!(registry.get(turn_id).is_some());
    }

    #[test]
    fn sweep_evicts_streams_past_retention() {
        let registry = StreamRegistry::new(StdDuration::from_millis(0));
        let turn_id = uuid::Uuid::new_v4();
        registry.register(Arc::new(Stream::new(turn_id, false)));
        registry.mark_finished(turn_id);
        std::thread::sleep(StdDuration::from_millis(5));

        let evicted = registry.sweep_expired();
        assert_eq!(evicted, 1);
        assert!(registry.get(turn_id).is_none());
    }

    #[test]
    fn shutdown_cancels_and_clears_all_streams() {
        let registry = StreamRegistry::new(StdDuration::from_secs(600));
        let turn_id = uuid::Uuid::new_v4();
        let stream = Arc::new(Stream::new(turn_id, false));
        let token = stream.cancel_token();
        registry.register(stream);

        registry.shutdown();

        assert!(token.is_cancelled());
        assert!(registry.is_empty());
    }
}
