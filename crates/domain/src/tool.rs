//! Provider-agnostic tool call/result types, shared between the
//! executor and `ToolRegistry` implementations (spec.md §1
//! `ToolRegistry.ExecuteParallel`). Grounded on
//! `crates/domain/src/tool.rs::ToolCall` in the teacher.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_use_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_use_id: String,
    pub tool_name: String,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResult {
    pub fn success(tool_use_id: impl Into<String>, tool_name: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            is_error: false,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(tool_use_id: impl Into<String>, tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            is_error: true,
            result: None,
            error: Some(error.into()),
        }
    }
}
