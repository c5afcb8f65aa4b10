//! Structural moves over a tagged document.
//!
//! The engine works on an in-memory [`TaggedStore`] snapshot. Every operation
//! mutates a working copy and only replaces the caller's snapshot when all of
//! it succeeded, so a failed move leaves the snapshot untouched. Persisting
//! the result is the caller's job (exactly once per operation).

mod cross_tag;
pub mod rewrite;
mod within_tag;

use serde::Serialize;
use std::sync::Arc;

use crate::domain::{DependencyConflict, EntityId, StoreError, TagPartition};
use crate::graph::DependencyGraph;
use crate::ports::Clock;

/// What a single within-tag move did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    /// task -> task (renumber)
    Renumber,
    /// task -> subtask
    Demote,
    /// subtask -> task
    Promote,
    /// subtask -> subtask
    Relocate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub from: EntityId,
    pub to: EntityId,
    pub kind: MoveKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMoveOutcome {
    pub tag: String,
    pub moves: Vec<MoveOutcome>,
}

/// Options for [`MoveEngine::move_tasks_between_tags`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrossTagMoveOptions {
    /// Carry every task the moving set depends on (transitively).
    pub with_dependencies: bool,
    /// Drop the dependency references that would cross the tag boundary.
    pub ignore_dependencies: bool,
    /// Skip target tag name validation.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTagMoveOutcome {
    pub source_tag: String,
    pub target_tag: String,
    /// Every task that changed tag, in the order appended to the target.
    pub moved_ids: Vec<u32>,
    /// Tasks added to the request because of `with_dependencies`.
    pub carried_ids: Vec<u32>,
    /// References removed because of `ignore_dependencies`.
    pub removed_dependencies: Vec<DependencyConflict>,
    pub message: String,
}

/// Applies moves to a snapshot.
pub struct MoveEngine {
    clock: Arc<dyn Clock>,
}

impl MoveEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Fail if `after` has a cycle that `before` did not have.
fn ensure_no_new_cycle(before: &TagPartition, after: &TagPartition) -> Result<(), StoreError> {
    let Some(path) = DependencyGraph::from_partition(after).detect_cycle() else {
        return Ok(());
    };
    if DependencyGraph::from_partition(before).has_cycle() {
        tracing::debug!("partition already had a dependency cycle; not blocking move");
        return Ok(());
    }
    Err(StoreError::DependencyCycle {
        path: path.iter().map(ToString::to_string).collect(),
    })
}
