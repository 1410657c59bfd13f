//! Repository contracts and in-process reference implementations (spec.md
//! §4.7, §1 "external collaborators").

pub mod external;
pub mod memory;
pub mod traits;

pub use external::{InMemoryChatStore, InMemoryDocumentStore, InMemoryProjectStore, InMemorySkillStore};
pub use memory::{InMemoryTurnStore, SharedTurnStore};
pub use traits::{
    ChatStore, DocumentStore, PaginatedTurns, PaginationDirection, ProjectStore, SkillStore,
    TurnMetadataUpdate, TurnNavigator, TurnReader, TurnWriter,
};
