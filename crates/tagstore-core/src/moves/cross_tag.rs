//! Moving whole tasks from one tag to another.

use std::collections::HashSet;
use tracing::{info, warn};

use super::{CrossTagMoveOptions, CrossTagMoveOutcome, MoveEngine};
use crate::domain::{
    parse_id, validate_tag_name, DependencyConflict, DependencyRef, DependencyScope, StoreError,
    TaggedStore, Task,
};
use crate::graph::{find_cross_tag_dependencies, get_dependent_task_ids, validate_subtask_move, TaskIndex};

impl MoveEngine {
    /// Move tasks `source_ids` from `source_tag` to `target_tag`, creating
    /// the target tag when needed.
    ///
    /// Dependencies left behind in the source tag are conflicts. They fail the
    /// move unless `options` says how to resolve them.
    pub fn move_tasks_between_tags<S: AsRef<str>>(
        &self,
        store: &mut TaggedStore,
        source_ids: &[S],
        source_tag: &str,
        target_tag: &str,
        options: &CrossTagMoveOptions,
    ) -> Result<CrossTagMoveOutcome, StoreError> {
        if source_tag == target_tag {
            return Err(StoreError::SameTag {
                tag: source_tag.to_string(),
            });
        }
        if !store.contains_tag(source_tag) {
            return Err(StoreError::TagNotFound {
                tag: source_tag.to_string(),
            });
        }
        if !options.force {
            validate_tag_name(target_tag)?;
        }
        if options.with_dependencies && options.ignore_dependencies {
            return Err(StoreError::InvalidOptions {
                reason: "withDependencies and ignoreDependencies are mutually exclusive".to_string(),
            });
        }
        if source_ids.is_empty() {
            return Err(StoreError::InvalidMove {
                reason: "no task ids given".to_string(),
            });
        }

        let mut requested: Vec<u32> = Vec::with_capacity(source_ids.len());
        for raw in source_ids {
            let id = parse_id(raw.as_ref())?;
            validate_subtask_move(&id, source_tag, target_tag)?;
            if !requested.contains(&id.task_id()) {
                requested.push(id.task_id());
            }
        }

        let index = TaskIndex::from_store(store);
        let conflicts = find_cross_tag_dependencies(&requested, source_tag, target_tag, &index)?;

        let mut moving = requested.clone();
        let mut carried = Vec::new();
        let mut removed = Vec::new();
        if !conflicts.is_empty() {
            if options.with_dependencies {
                carried = get_dependent_task_ids(&requested, &conflicts, source_tag, &index);
                moving.extend(carried.iter().copied());
            } else if options.ignore_dependencies {
                removed = conflicts;
            } else {
                return Err(StoreError::CrossTagDependencyConflict {
                    source_tag: source_tag.to_string(),
                    target_tag: target_tag.to_string(),
                    conflicts,
                });
            }
        }

        if let Some(target) = store.tag(target_tag)
            && let Some(&taken) = moving.iter().find(|&&id| target.contains_task(id))
        {
            return Err(StoreError::TaskIdConflict {
                task_id: taken,
                tag: target_tag.to_string(),
            });
        }

        let now = self.clock.now();
        let mut working = store.clone();
        let mut tasks = Vec::with_capacity(moving.len());
        {
            let source = working.tag_mut(source_tag).ok_or_else(|| StoreError::TagNotFound {
                tag: source_tag.to_string(),
            })?;
            for &id in &moving {
                let mut task = source.remove_task(id).ok_or_else(|| StoreError::TaskNotFound {
                    task_id: id,
                    tag: source_tag.to_string(),
                })?;
                sever(&mut task, &removed);
                tasks.push(task);
            }
            source.touch(now);
        }
        let target = working.ensure_tag(target_tag, now);
        target.tasks.extend(tasks);
        target.touch(now);
        *store = working;

        if !removed.is_empty() {
            warn!(
                source_tag,
                target_tag,
                removed = removed.len(),
                "dropped cross-tag dependency references"
            );
        }
        info!(source_tag, target_tag, moved = ?moving, "moved tasks between tags");
        Ok(CrossTagMoveOutcome {
            source_tag: source_tag.to_string(),
            target_tag: target_tag.to_string(),
            message: format!(
                "Moved {} task(s) from '{source_tag}' to '{target_tag}'",
                moving.len()
            ),
            moved_ids: moving,
            carried_ids: carried,
            removed_dependencies: removed,
        })
    }
}

/// Remove the conflicting references held by `task` or its subtasks.
fn sever(task: &mut Task, conflicts: &[DependencyConflict]) {
    let cut: HashSet<u32> = conflicts
        .iter()
        .filter(|c| c.task_id == task.id)
        .map(|c| c.dependency_id)
        .collect();
    if cut.is_empty() {
        return;
    }
    task.dependencies.retain(|value| {
        DependencyRef::resolve(value, DependencyScope::Task)
            .is_none_or(|dep| !cut.contains(&dep.task_target(None)))
    });

    let parent_id = task.id;
    let sibling_ids = task.subtask_ids();
    let scope = DependencyScope::Subtask {
        parent_id,
        sibling_ids: &sibling_ids,
    };
    for subtask in &mut task.subtasks {
        subtask.dependencies.retain(|value| {
            DependencyRef::resolve(value, scope)
                .is_none_or(|dep| !cut.contains(&dep.task_target(Some(parent_id))))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{engine, now, store_with};
    use super::*;
    use crate::domain::{DependencyValue, Subtask, TagPartition};

    fn backlog_store() -> TaggedStore {
        let mut store = store_with(
            "backlog",
            vec![
                Task::new(1, "api").with_dependencies([2u32]),
                Task::new(2, "schema").with_dependencies([3u32]),
                Task::new(3, "infra"),
                Task::new(4, "docs").with_subtask(Subtask::new(1, "draft").with_dependencies([5u32])),
                Task::new(5, "style"),
                Task::new(6, "standalone"),
            ],
        );
        store.insert_tag(
            "in-progress",
            TagPartition::new(now(), None).with_tasks(vec![Task::new(10, "running")]),
        );
        store
    }

    fn ids(store: &TaggedStore, tag: &str) -> Vec<u32> {
        store.tag(tag).unwrap().task_ids()
    }

    #[test]
    fn conflicting_move_is_denied_by_default() {
        let mut store = backlog_store();
        let before = store.clone();
        let err = engine()
            .move_tasks_between_tags(
                &mut store,
                &["1"],
                "backlog",
                "in-progress",
                &CrossTagMoveOptions::default(),
            )
            .unwrap_err();
        match err {
            StoreError::CrossTagDependencyConflict { conflicts, .. } => {
                let pairs: Vec<_> = conflicts.iter().map(|c| (c.task_id, c.dependency_id)).collect();
                assert_eq!(pairs, vec![(1, 2)]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store, before);
    }

    #[test]
    fn free_task_moves_and_target_is_appended() {
        let mut store = backlog_store();
        let outcome = engine()
            .move_tasks_between_tags(
                &mut store,
                &["6"],
                "backlog",
                "in-progress",
                &CrossTagMoveOptions::default(),
            )
            .unwrap();
        assert_eq!(outcome.moved_ids, vec![6]);
        assert_eq!(ids(&store, "in-progress"), vec![10, 6]);
        assert!(!store.tag("backlog").unwrap().contains_task(6));
        assert_eq!(store.tag("in-progress").unwrap().metadata.updated, now());
    }

    #[test]
    fn with_dependencies_carries_the_closure() {
        let mut store = backlog_store();
        let options = CrossTagMoveOptions {
            with_dependencies: true,
            ..Default::default()
        };
        let outcome = engine()
            .move_tasks_between_tags(&mut store, &["1"], "backlog", "in-progress", &options)
            .unwrap();
        assert_eq!(outcome.carried_ids, vec![2, 3]);
        assert_eq!(ids(&store, "in-progress"), vec![10, 1, 2, 3]);
        assert_eq!(ids(&store, "backlog"), vec![4, 5, 6]);
    }

    #[test]
    fn ignore_dependencies_severs_the_links() {
        let mut store = backlog_store();
        let options = CrossTagMoveOptions {
            ignore_dependencies: true,
            ..Default::default()
        };
        let outcome = engine()
            .move_tasks_between_tags(&mut store, &["1", "4"], "backlog", "in-progress", &options)
            .unwrap();
        assert_eq!(outcome.removed_dependencies.len(), 2);

        let target = store.tag("in-progress").unwrap();
        assert!(target.task(1).unwrap().dependencies.is_empty());
        assert!(target.task(4).unwrap().subtask(1).unwrap().dependencies.is_empty());
        assert_eq!(
            store.tag("backlog").unwrap().task(2).unwrap().dependencies,
            vec![DependencyValue::Number(3)]
        );
    }

    #[test]
    fn target_tag_is_created_on_demand() {
        let mut store = backlog_store();
        engine()
            .move_tasks_between_tags(
                &mut store,
                &["6"],
                "backlog",
                "later",
                &CrossTagMoveOptions::default(),
            )
            .unwrap();
        assert_eq!(ids(&store, "later"), vec![6]);
        assert_eq!(store.tag("later").unwrap().metadata.created, now());
    }

    #[test]
    fn subtasks_cannot_cross_tags() {
        let mut store = backlog_store();
        let err = engine()
            .move_tasks_between_tags(
                &mut store,
                &["4.1"],
                "backlog",
                "in-progress",
                &CrossTagMoveOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::SubtaskCrossTagMove { .. }));
    }

    #[test]
    fn tag_level_preconditions() {
        let mut store = backlog_store();
        let engine = engine();
        let none = CrossTagMoveOptions::default();
        assert!(matches!(
            engine.move_tasks_between_tags(&mut store, &["1"], "backlog", "backlog", &none),
            Err(StoreError::SameTag { .. })
        ));
        assert!(matches!(
            engine.move_tasks_between_tags(&mut store, &["1"], "missing", "backlog", &none),
            Err(StoreError::TagNotFound { .. })
        ));
        assert!(matches!(
            engine.move_tasks_between_tags(&mut store, &["42"], "backlog", "in-progress", &none),
            Err(StoreError::TaskNotFound { task_id: 42, .. })
        ));
        let both = CrossTagMoveOptions {
            with_dependencies: true,
            ignore_dependencies: true,
            force: false,
        };
        assert!(matches!(
            engine.move_tasks_between_tags(&mut store, &["1"], "backlog", "in-progress", &both),
            Err(StoreError::InvalidOptions { .. })
        ));
    }

    #[test]
    fn force_skips_target_name_validation() {
        let mut store = backlog_store();
        let engine = engine();
        let err = engine
            .move_tasks_between_tags(
                &mut store,
                &["6"],
                "backlog",
                "odd name",
                &CrossTagMoveOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTagName { .. }));

        let forced = CrossTagMoveOptions {
            force: true,
            ..Default::default()
        };
        engine
            .move_tasks_between_tags(&mut store, &["6"], "backlog", "odd name", &forced)
            .unwrap();
        assert_eq!(ids(&store, "odd name"), vec![6]);
    }

    #[test]
    fn id_collision_in_target_is_rejected() {
        let mut store = backlog_store();
        store
            .tag_mut("in-progress")
            .unwrap()
            .tasks
            .push(Task::new(6, "clash"));
        let err = engine()
            .move_tasks_between_tags(
                &mut store,
                &["6"],
                "backlog",
                "in-progress",
                &CrossTagMoveOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::TaskIdConflict { task_id: 6, .. }));
    }
}
