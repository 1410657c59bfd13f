//! Reference [`ToolRegistry`] implementation: an in-memory name→[`Tool`]
//! map that fans calls out with `join_all` (spec.md §4.5 step 1).
//!
//! Grounded on the concurrent-dispatch pattern in the teacher's
//! `crates/gateway/src/runtime/turn.rs`, where pending tool calls for one
//! round are awaited together rather than sequentially.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use turnengine_domain::tool::{ToolCall, ToolCallResult};

use crate::traits::{Tool, ToolRegistry};

#[derive(Default)]
pub struct InMemoryToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    async fn run_one(tool: Option<Arc<dyn Tool>>, call: ToolCall) -> ToolCallResult {
        match tool {
            Some(tool) => match tool.execute(call.input).await {
                Ok(result) => ToolCallResult::success(call.tool_use_id, call.tool_name, result),
                Err(message) => ToolCallResult::failure(call.tool_use_id, call.tool_name, message),
            },
            None => ToolCallResult::failure(
                call.tool_use_id,
                call.tool_name.clone(),
                format!("no tool registered with name '{}'", call.tool_name),
            ),
        }
    }
}

#[async_trait::async_trait]
impl ToolRegistry for InMemoryToolRegistry {
    async fn execute_parallel(&self, calls: Vec<ToolCall>) -> Vec<ToolCallResult> {
        let futures = calls.into_iter().map(|call| {
            let tool = self.tools.get(&call.tool_name).cloned();
            Self::run_one(tool, call)
        });
        join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc_view::DocViewTool;
    use turnengine_store::InMemoryDocumentStore;

    #[tokio::test]
    async fn executes_known_tools_concurrently_and_preserves_order() {
        let mut registry = InMemoryToolRegistry::new();
        let docs = Arc::new(InMemoryDocumentStore::new());
        docs.seed("doc-1", "hello world");
        registry.register(Arc::new(DocViewTool::new(docs)));

        let calls = vec![
            ToolCall {
                tool_use_id: "u1".into(),
                tool_name: "doc_view".into(),
                input: serde_json::json!({ "document_id": "doc-1" }),
            },
            ToolCall {
                tool_use_id: "u2".into(),
                tool_name: "nonexistent".into(),
                input: serde_json::json!({}),
            },
        ];

        let results = registry.execute_parallel(calls).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool_use_id, "u1");
        assert!(!results[0].is_error);
        assert_eq!(results[1].tool_use_id, "u2");
        assert!(results[1].is_error);
    }
}
