//! Cross-tag dependency validation.
//!
//! A dependency resolves inside the tag of the task holding it. Moving a task
//! to another tag while something it depends on stays behind leaves an edge
//! pointing across the tag boundary: a conflict.
//!
//! - `find_cross_tag_dependencies` reports direct edges from the moving set
//!   into tasks that are not moving (one level, no expansion).
//! - `get_dependent_task_ids` follows dependency edges transitively; it is the
//!   set carried along when the caller asks to move dependencies too.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::{DependencyConflict, EntityId, StoreError, TaggedStore};

/// One task as seen by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedTask {
    pub tag: String,
    pub id: u32,
    /// Task-level ids this task needs, from its own list and from its
    /// subtasks' references that leave the task. First-seen order, no repeats.
    pub dependency_ids: Vec<u32>,
}

/// Flat index of every task in every tag.
#[derive(Debug, Default)]
pub struct TaskIndex {
    entries: Vec<IndexedTask>,
    by_key: HashMap<(String, u32), usize>,
}

impl TaskIndex {
    pub fn from_store(store: &TaggedStore) -> Self {
        let mut index = Self::default();
        for (tag, partition) in store.tags() {
            for task in &partition.tasks {
                let mut deps: Vec<u32> = Vec::new();
                let mut push = |id: u32| {
                    if id != task.id && !deps.contains(&id) {
                        deps.push(id);
                    }
                };
                for dep in task.resolved_dependencies() {
                    push(dep.task_target(None));
                }
                for subtask in &task.subtasks {
                    for dep in subtask.resolved_dependencies(task) {
                        push(dep.task_target(Some(task.id)));
                    }
                }
                index.insert(IndexedTask {
                    tag: tag.clone(),
                    id: task.id,
                    dependency_ids: deps,
                });
            }
        }
        index
    }

    pub fn insert(&mut self, task: IndexedTask) {
        let key = (task.tag.clone(), task.id);
        if let Some(&at) = self.by_key.get(&key) {
            self.entries[at] = task;
        } else {
            self.by_key.insert(key, self.entries.len());
            self.entries.push(task);
        }
    }

    pub fn get(&self, tag: &str, id: u32) -> Option<&IndexedTask> {
        self.by_key
            .get(&(tag.to_string(), id))
            .map(|&at| &self.entries[at])
    }

    pub fn contains_tag(&self, tag: &str) -> bool {
        self.entries.iter().any(|t| t.tag == tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of a single-task check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossTagValidation {
    pub can_move: bool,
    pub conflicts: Vec<DependencyConflict>,
}

/// Direct-dependency check for one task: every dependency that stays behind
/// in `source_tag` is a conflict. A move into the same tag crosses no
/// boundary and never conflicts.
pub fn validate_cross_tag_move(
    task: &IndexedTask,
    source_tag: &str,
    target_tag: &str,
    index: &TaskIndex,
) -> CrossTagValidation {
    if source_tag == target_tag {
        return CrossTagValidation {
            can_move: true,
            conflicts: Vec::new(),
        };
    }
    let conflicts: Vec<DependencyConflict> = task
        .dependency_ids
        .iter()
        .filter_map(|&dep| index.get(source_tag, dep))
        .map(|dep| DependencyConflict {
            task_id: task.id,
            dependency_id: dep.id,
            dependency_tag: dep.tag.clone(),
        })
        .collect();
    CrossTagValidation {
        can_move: conflicts.is_empty(),
        conflicts,
    }
}

/// Conflicts for moving `source_ids` together. Dependencies that are part of
/// the moving set are not conflicts.
pub fn find_cross_tag_dependencies(
    source_ids: &[u32],
    source_tag: &str,
    target_tag: &str,
    index: &TaskIndex,
) -> Result<Vec<DependencyConflict>, StoreError> {
    if !index.contains_tag(source_tag) {
        return Err(StoreError::TagNotFound {
            tag: source_tag.to_string(),
        });
    }
    let moving: HashSet<u32> = source_ids.iter().copied().collect();
    let mut conflicts: Vec<DependencyConflict> = Vec::new();
    for &id in source_ids {
        let task = index.get(source_tag, id).ok_or_else(|| StoreError::TaskNotFound {
            task_id: id,
            tag: source_tag.to_string(),
        })?;
        for conflict in validate_cross_tag_move(task, source_tag, target_tag, index).conflicts {
            if !moving.contains(&conflict.dependency_id) && !conflicts.contains(&conflict) {
                conflicts.push(conflict);
            }
        }
    }
    Ok(conflicts)
}

/// Every task in `source_tag` reachable from the moving set by following
/// dependency edges, transitively. The moving tasks themselves are excluded.
/// Returned in discovery order.
pub fn get_dependent_task_ids(
    source_ids: &[u32],
    conflicts: &[DependencyConflict],
    source_tag: &str,
    index: &TaskIndex,
) -> Vec<u32> {
    let moving: HashSet<u32> = source_ids.iter().copied().collect();
    let mut seen: HashSet<u32> = moving.clone();
    let mut queue: VecDeque<u32> = VecDeque::new();
    let mut out = Vec::new();

    let seeds = conflicts
        .iter()
        .map(|c| c.dependency_id)
        .chain(
            source_ids
                .iter()
                .filter_map(|&id| index.get(source_tag, id))
                .flat_map(|t| t.dependency_ids.iter().copied()),
        );
    for id in seeds {
        if index.get(source_tag, id).is_some() && seen.insert(id) {
            out.push(id);
            queue.push_back(id);
        }
    }

    while let Some(id) = queue.pop_front() {
        let Some(task) = index.get(source_tag, id) else {
            continue;
        };
        for &dep in &task.dependency_ids {
            if index.get(source_tag, dep).is_some() && seen.insert(dep) {
                out.push(dep);
                queue.push_back(dep);
            }
        }
    }
    out
}

/// Subtasks never cross tags on their own.
pub fn validate_subtask_move(id: &EntityId, source_tag: &str, target_tag: &str) -> Result<(), StoreError> {
    if id.is_subtask() {
        tracing::debug!(%id, source_tag, target_tag, "rejecting cross-tag move of a subtask");
        return Err(StoreError::SubtaskCrossTagMove { id: id.to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Subtask, TagPartition, Task};
    use chrono::Utc;

    fn store() -> TaggedStore {
        let mut store = TaggedStore::with_master(Utc::now());
        store.insert_tag(
            "backlog",
            TagPartition::new(Utc::now(), None).with_tasks(vec![
                Task::new(1, "api").with_dependencies([2u32]),
                Task::new(2, "schema").with_dependencies([3u32]),
                Task::new(3, "infra"),
                Task::new(4, "docs").with_subtask(Subtask::new(1, "d1").with_dependencies([5u32])),
                Task::new(5, "style guide"),
                Task::new(6, "standalone"),
            ]),
        );
        store.insert_tag(
            "in-progress",
            TagPartition::new(Utc::now(), None).with_tasks(vec![Task::new(2, "unrelated")]),
        );
        store
    }

    #[test]
    fn index_collects_task_and_subtask_dependencies() {
        let index = TaskIndex::from_store(&store());
        assert_eq!(index.get("backlog", 1).unwrap().dependency_ids, vec![2]);
        assert_eq!(index.get("backlog", 4).unwrap().dependency_ids, vec![5]);
        assert!(index.get("in-progress", 2).unwrap().dependency_ids.is_empty());
        assert_eq!(index.len(), 7);
    }

    #[test]
    fn single_task_check_reports_direct_dependencies_only() {
        let index = TaskIndex::from_store(&store());
        let task = index.get("backlog", 1).unwrap();
        let result = validate_cross_tag_move(task, "backlog", "in-progress", &index);
        assert!(!result.can_move);
        assert_eq!(
            result.conflicts,
            vec![DependencyConflict {
                task_id: 1,
                dependency_id: 2,
                dependency_tag: "backlog".to_string(),
            }]
        );

        let free = index.get("backlog", 6).unwrap();
        assert!(validate_cross_tag_move(free, "backlog", "in-progress", &index).can_move);
    }

    #[test]
    fn same_tag_check_never_conflicts() {
        let index = TaskIndex::from_store(&store());
        let task = index.get("backlog", 1).unwrap();
        let result = validate_cross_tag_move(task, "backlog", "backlog", &index);
        assert!(result.can_move);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn conflicts_default_deny_literal_case() {
        let index = TaskIndex::from_store(&store());
        let conflicts = find_cross_tag_dependencies(&[1], "backlog", "in-progress", &index).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!((conflicts[0].task_id, conflicts[0].dependency_id), (1, 2));
    }

    #[test]
    fn dependencies_inside_the_moving_set_are_not_conflicts() {
        let index = TaskIndex::from_store(&store());
        let conflicts = find_cross_tag_dependencies(&[1, 2], "backlog", "in-progress", &index).unwrap();
        assert_eq!(
            conflicts
                .iter()
                .map(|c| (c.task_id, c.dependency_id))
                .collect::<Vec<_>>(),
            vec![(2, 3)]
        );
    }

    #[test]
    fn subtask_references_count_as_conflicts_of_their_parent() {
        let index = TaskIndex::from_store(&store());
        let conflicts = find_cross_tag_dependencies(&[4], "backlog", "in-progress", &index).unwrap();
        assert_eq!(conflicts[0].task_id, 4);
        assert_eq!(conflicts[0].dependency_id, 5);
    }

    #[test]
    fn unknown_inputs_fail() {
        let index = TaskIndex::from_store(&store());
        assert!(matches!(
            find_cross_tag_dependencies(&[1], "nope", "in-progress", &index),
            Err(StoreError::TagNotFound { .. })
        ));
        assert!(matches!(
            find_cross_tag_dependencies(&[42], "backlog", "in-progress", &index),
            Err(StoreError::TaskNotFound { task_id: 42, .. })
        ));
    }

    #[test]
    fn dependent_ids_are_the_full_transitive_closure() {
        let index = TaskIndex::from_store(&store());
        let conflicts = find_cross_tag_dependencies(&[1], "backlog", "in-progress", &index).unwrap();
        let carried = get_dependent_task_ids(&[1], &conflicts, "backlog", &index);
        assert_eq!(carried, vec![2, 3]);
    }

    #[test]
    fn dependent_ids_ignore_missing_targets() {
        let mut store = store();
        store
            .tag_mut("backlog")
            .unwrap()
            .task_mut(3)
            .unwrap()
            .dependencies = vec![99u32.into()];
        let index = TaskIndex::from_store(&store);
        let carried = get_dependent_task_ids(&[1], &[], "backlog", &index);
        assert_eq!(carried, vec![2, 3]);
    }

    #[test]
    fn subtask_ids_are_rejected_for_cross_tag_moves() {
        let id = EntityId::parse("4.1").unwrap();
        assert!(matches!(
            validate_subtask_move(&id, "backlog", "in-progress"),
            Err(StoreError::SubtaskCrossTagMove { .. })
        ));
        assert!(validate_subtask_move(&EntityId::Task(4), "backlog", "in-progress").is_ok());
    }
}
