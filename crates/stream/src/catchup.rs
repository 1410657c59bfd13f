//! `BlockSerializer` and `CatchupBuilder` (spec.md §4.5) — a pure
//! projection from persisted turn/block rows to the same `SseEvent`
//! sequence a live executor would have published.
//!
//! Grounded on the "send the current state and close" / "run.snapshot"
//! path in the teacher's `run_events_sse` (`crates/gateway/src/api/runs.rs`)
//! — replaying a finished or in-progress record from storage rather than
//! requiring a live channel — generalized here into the full per-block
//! `turn_start`/`block_start`/`block_delta`/`block_stop` sequence spec.md
//! §4.5 specifies.

use std::sync::Arc;

use turnengine_domain::block::TurnBlock;
use turnengine_domain::error::Result;
use turnengine_domain::sse_event::SseEvent;
use turnengine_store::TurnReader;

/// A catchup or live event tagged with its `event-<n>` id. Live events only
/// carry an id when debug mode is enabled (§4.4); catchup always assigns
/// one so `Last-Event-ID` filtering works.
#[derive(Debug, Clone)]
pub struct IndexedEvent {
    pub id: Option<String>,
    pub event: SseEvent,
}

/// Converts one persisted [`TurnBlock`] into its `block_start` /
/// `block_delta`* / `block_stop` event triple (§4.5 step 4).
pub struct BlockSerializer;

impl BlockSerializer {
    pub fn serialize(block: &TurnBlock) -> Vec<SseEvent> {
        let mut events = Vec::with_capacity(3);
        events.push(SseEvent::BlockStart {
            block_index: block.sequence,
            block_type: Some(block.block_type.as_str().to_string()),
        });

        if block.block_type.requires_text_content() {
            if let Some(text) = block.text_content.as_deref() {
                if !text.is_empty() {
                    events.push(SseEvent::BlockDelta {
                        block_index: block.sequence,
                        delta_type: "text".into(),
                        text_delta: Some(text.to_string()),
                        signature_delta: None,
                        json_delta: None,
                    });
                }
            }
        }

        if let Some(content) = &block.content {
            if let Ok(json) = serde_json::to_value(content) {
                events.push(SseEvent::BlockDelta {
                    block_index: block.sequence,
                    delta_type: "json".into(),
                    text_delta: None,
                    signature_delta: None,
                    json_delta: Some(json),
                });
            }
        }

        events.push(SseEvent::BlockStop {
            block_index: block.sequence,
        });
        events
    }
}

/// Builds the catchup replay for one turn from durable storage alone
/// (§4.4 "the catchup function does not require a live stream").
pub struct CatchupBuilder<R: TurnReader + ?Sized> {
    reader: Arc<R>,
}

impl<R: TurnReader + ?Sized> CatchupBuilder<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self { reader }
    }

    /// Reconstruct the event sequence for `turn_id`, filtered to events
    /// after `last_event_id` (an `event-<n>` string) if given (§4.5
    /// "Filter after Last-Event-ID").
    ///
    /// Never emits `turn_complete`/`turn_error` (§4.5 step 5) — a finished
    /// turn's final status is read from the `Turn` row, not replayed.
    pub async fn build(&self, turn_id: uuid::Uuid, last_event_id: Option<&str>) -> Result<Vec<IndexedEvent>> {
        let turn = self.reader.get_turn(turn_id).await?;
        let blocks = self.reader.get_turn_blocks(turn_id).await?;

        let mut events = vec![SseEvent::TurnStart {
            turn_id,
            model: turn.model.clone().unwrap_or_default(),
        }];
        for block in &blocks {
            events.extend(BlockSerializer::serialize(block));
        }

        let indexed: Vec<IndexedEvent> = events
            .into_iter()
            .enumerate()
            .map(|(i, event)| IndexedEvent {
                id: Some(format!("event-{i}")),
                event,
            })
            .collect();

        Ok(filter_after(indexed, last_event_id))
    }
}

fn filter_after(events: Vec<IndexedEvent>, last_event_id: Option<&str>) -> Vec<IndexedEvent> {
    let Some(last_id) = last_event_id else {
        return events;
    };
    let Some(last_index) = last_id.strip_prefix("event-").and_then(|n| n.parse::<usize>().ok()) else {
        return events;
    };
    events
        .into_iter()
        .filter(|e| {
            e.id
                .as_deref()
                .and_then(|id| id.strip_prefix("event-"))
                .and_then(|n| n.parse::<usize>().ok())
                .map(|n| n > last_index)
                .unwrap_or(true)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnengine_domain::block::BlockStatus;
    use turnengine_domain::turn::RequestParams;
    use turnengine_domain::turn::Turn;
    use turnengine_store::InMemoryTurnStore;

    #[tokio::test]
    async fn catchup_never_emits_terminal_events() {
        let store = Arc::new(InMemoryTurnStore::in_memory_only());
        let user = Turn::new_user(uuid::Uuid::new_v4(), None);
        store.create_turn(user.clone()).await.unwrap();
        let assistant = Turn::new_assistant(user.chat_id, user.id, "mock-small".into(), RequestParams::default());
        store.create_turn(assistant.clone()).await.unwrap();
        let block = TurnBlock::new_text(assistant.id, 0, "hello", BlockStatus::Complete);
        store.create_turn_block(block).await.unwrap();

        let builder = CatchupBuilder::new(store);
        let events = builder.build(assistant.id, None).await.unwrap();

        assert!(events.iter().all(|e| !e.event.is_terminal()));
        assert!(matches!(events[0].event, SseEvent::TurnStart { .. }));
    }

    #[tokio::test]
    async fn last_event_id_filters_replayed_prefix() {
        let store = Arc::new(InMemoryTurnStore::in_memory_only());
        let user = Turn::new_user(uuid::Uuid::new_v4(), None);
        store.create_turn(user.clone()).await.unwrap();
        let assistant = Turn::new_assistant(user.chat_id, user.id, "mock-small".into(), RequestParams::default());
        store.create_turn(assistant.clone()).await.unwrap();
        store
            .create_turn_block(TurnBlock::new_text(assistant.id, 0, "hi", BlockStatus::Complete))
            .await
            .unwrap();

        let builder = CatchupBuilder::new(store);
        let full = builder.build(assistant.id, None).await.unwrap();
        let partial = builder.build(assistant.id, Some("event-0")).await.unwrap();

        assert!(partial.len() < full.len());
    }
}
