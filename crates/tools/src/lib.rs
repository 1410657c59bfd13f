//! The `ToolRegistry` seam plus a small reference implementation (spec.md
//! §1 `ToolRegistry.ExecuteParallel`). Real tool hosts are out of scope;
//! `doc_view` exists only to exercise the fan-out path end to end.

pub mod doc_view;
pub mod registry;
pub mod traits;

pub use doc_view::DocViewTool;
pub use registry::InMemoryToolRegistry;
pub use traits::{Tool, ToolRegistry};
