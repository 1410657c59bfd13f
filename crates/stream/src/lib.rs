//! Per-turn pub/sub, catchup replay, and the stream registry (spec.md
//! §4.4, §4.5).

pub mod cancel;
pub mod catchup;
pub mod registry;
pub mod stream;

pub use cancel::CancelToken;
pub use catchup::{BlockSerializer, CatchupBuilder, IndexedEvent};
pub use registry::StreamRegistry;
pub use stream::Stream;
