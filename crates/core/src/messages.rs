//! `MessageBuilder` (spec.md §4.6) — pure conversion from a turn path
//! plus its attached blocks into provider-ready messages.
//!
//! Grounded on the teacher's history-to-prompt assembly in
//! `crates/sessions/src/history.rs` (walking a stored conversation into
//! the shape a provider call expects), simplified here since blocks are
//! already typed `ContentBlock`s rather than raw transcript lines.

use std::collections::HashMap;

use turnengine_domain::block::TurnBlock;
use turnengine_domain::provider_event::Message;
use turnengine_domain::turn::Turn;

pub struct MessageBuilder;

impl MessageBuilder {
    /// Convert a root-to-leaf turn path into provider messages. Turns with
    /// no attached blocks are skipped with a warning rather than emitted
    /// as an empty message (§4.6 "a turn with zero blocks contributes
    /// nothing"). `tool_result` blocks stay on the user-role message they
    /// were persisted under; the builder does not re-parent them onto a
    /// synthetic tool-role message — the turn-chaining executor is what
    /// decides which role a `tool_result` batch belongs to.
    pub fn build_messages(
        turns: &[Turn],
        blocks_by_turn: &HashMap<uuid::Uuid, Vec<TurnBlock>>,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(turns.len());
        for turn in turns {
            let blocks = match blocks_by_turn.get(&turn.id) {
                Some(blocks) if !blocks.is_empty() => blocks,
                _ => {
                    tracing::warn!(turn_id = %turn.id, "turn has no blocks, skipping in message build");
                    continue;
                }
            };
            messages.push(Message {
                role: turn.role,
                blocks: blocks.iter().map(Into::into).collect(),
            });
        }
        messages
    }
}
