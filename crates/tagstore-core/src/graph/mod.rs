//! Dependency graph queries and cross-tag validation.

pub mod cross_tag;
pub mod dependency;

pub use cross_tag::{
    find_cross_tag_dependencies, get_dependent_task_ids, validate_cross_tag_move,
    validate_subtask_move, CrossTagValidation, IndexedTask, TaskIndex,
};
pub use dependency::DependencyGraph;
