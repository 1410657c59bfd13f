//! `doc_view` — an example backend tool reading a document by id through
//! [`DocumentStore`]. Stands in for the real tool host named in spec.md §1
//! ("Tool implementations, abstracted behind `ToolRegistry.ExecuteParallel`");
//! exists so the crate and the worked scenarios in SPEC_FULL.md §8 are
//! exercisable without one.

use std::sync::Arc;

use serde::Deserialize;
use turnengine_store::DocumentStore;

use crate::traits::Tool;

#[derive(Debug, Deserialize)]
struct DocViewInput {
    document_id: String,
}

pub struct DocViewTool {
    documents: Arc<dyn DocumentStore>,
}

impl DocViewTool {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }
}

#[async_trait::async_trait]
impl Tool for DocViewTool {
    fn name(&self) -> &str {
        "doc_view"
    }

    async fn execute(&self, input: serde_json::Value) -> Result<serde_json::Value, String> {
        let input: DocViewInput =
            serde_json::from_value(input).map_err(|e| format!("invalid input: {e}"))?;

        let content = self
            .documents
            .get_document(&input.document_id)
            .await
            .map_err(|e| e.to_string())?;

        Ok(serde_json::json!({ "document_id": input.document_id, "content": content }))
    }
}
