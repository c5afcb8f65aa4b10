//! Domain model (ids, dependency references, tasks, the tagged document, errors).

pub mod dependency;
pub mod errors;
pub mod ids;
pub mod store;
pub mod task;

pub use dependency::{DependencyConflict, DependencyRef, DependencyScope, DependencyValue};
pub use errors::{ErrorKind, StoreError};
pub use ids::{parse_id, EntityId, IdKind, LockId};
pub use store::{validate_tag_name, TagMetadata, TagPartition, TaggedStore, MASTER_TAG};
pub use task::{Priority, Subtask, Task, TaskStatus};
