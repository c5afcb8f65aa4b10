//! Moves inside one tag: renumber, demote, promote, relocate.

use tracing::{debug, info};

use super::rewrite::{promote_dependencies, relocate_dependencies};
use super::{ensure_no_new_cycle, BatchMoveOutcome, MoveEngine, MoveKind, MoveOutcome};
use crate::domain::{parse_id, EntityId, StoreError, Subtask, TagPartition, TaggedStore, Task};

impl MoveEngine {
    /// Move one task or subtask to a new id inside `tag`.
    pub fn move_within_tag(
        &self,
        store: &mut TaggedStore,
        tag: &str,
        source_id: &str,
        destination_id: &str,
    ) -> Result<MoveOutcome, StoreError> {
        let from = parse_id(source_id)?;
        let to = parse_id(destination_id)?;
        let original = store.tag(tag).ok_or_else(|| StoreError::TagNotFound {
            tag: tag.to_string(),
        })?;

        let mut working = original.clone();
        let outcome = apply_move(&mut working, tag, from, to)?;
        ensure_no_new_cycle(original, &working)?;

        working.touch(self.clock.now());
        store.insert_tag(tag, working);
        info!(tag, from = %from, to = %to, kind = ?outcome.kind, "moved");
        Ok(outcome)
    }

    /// Move several items at once. Pairs are applied in order against the
    /// same working copy; if any pair fails nothing is applied.
    pub fn move_batch_within_tag<S: AsRef<str>>(
        &self,
        store: &mut TaggedStore,
        tag: &str,
        source_ids: &[S],
        destination_ids: &[S],
    ) -> Result<BatchMoveOutcome, StoreError> {
        if source_ids.len() != destination_ids.len() {
            return Err(StoreError::CountMismatch {
                sources: source_ids.len(),
                destinations: destination_ids.len(),
            });
        }
        let pairs = source_ids
            .iter()
            .zip(destination_ids)
            .map(|(s, d)| Ok((parse_id(s.as_ref())?, parse_id(d.as_ref())?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let original = store.tag(tag).ok_or_else(|| StoreError::TagNotFound {
            tag: tag.to_string(),
        })?;
        let mut working = original.clone();
        let mut moves = Vec::with_capacity(pairs.len());
        for (from, to) in pairs {
            moves.push(apply_move(&mut working, tag, from, to)?);
        }
        ensure_no_new_cycle(original, &working)?;

        if !moves.is_empty() {
            working.touch(self.clock.now());
            store.insert_tag(tag, working);
        }
        info!(tag, count = moves.len(), "batch moved");
        Ok(BatchMoveOutcome {
            tag: tag.to_string(),
            moves,
        })
    }
}

fn apply_move(
    partition: &mut TagPartition,
    tag: &str,
    from: EntityId,
    to: EntityId,
) -> Result<MoveOutcome, StoreError> {
    if from == to {
        return Err(StoreError::SameSourceAndDestination { id: from.to_string() });
    }
    debug!(tag, %from, %to, "applying move");
    match (from, to) {
        (EntityId::Task(src), EntityId::Task(dst)) => renumber(partition, tag, src, dst),
        (EntityId::Task(src), EntityId::Subtask { parent, subtask }) => {
            demote(partition, tag, src, parent, subtask)
        }
        (EntityId::Subtask { parent, subtask }, EntityId::Task(dst)) => {
            promote(partition, tag, parent, subtask, dst)
        }
        (
            EntityId::Subtask {
                parent: old_parent,
                subtask: old_id,
            },
            EntityId::Subtask {
                parent: new_parent,
                subtask: new_id,
            },
        ) => relocate(partition, tag, (old_parent, old_id), (new_parent, new_id)),
    }
}

fn source_not_found(id: EntityId, tag: &str) -> StoreError {
    StoreError::SourceNotFound {
        id: id.to_string(),
        tag: tag.to_string(),
    }
}

fn destination_exists(id: EntityId, tag: &str) -> StoreError {
    StoreError::DestinationExists {
        id: id.to_string(),
        tag: tag.to_string(),
    }
}

fn parent_not_found(parent_id: u32, tag: &str) -> StoreError {
    StoreError::DestinationParentNotFound {
        parent_id,
        tag: tag.to_string(),
    }
}

/// task -> task. References to the old id held by other tasks are left as
/// they are.
fn renumber(partition: &mut TagPartition, tag: &str, src: u32, dst: u32) -> Result<MoveOutcome, StoreError> {
    let from = EntityId::Task(src);
    let to = EntityId::Task(dst);
    if !partition.contains_task(src) {
        return Err(source_not_found(from, tag));
    }
    if partition.contains_task(dst) {
        return Err(destination_exists(to, tag));
    }
    let mut task = partition
        .remove_task(src)
        .ok_or_else(|| source_not_found(from, tag))?;
    task.id = dst;
    for subtask in &mut task.subtasks {
        if subtask.parent_task_id.is_some() {
            subtask.parent_task_id = Some(dst);
        }
    }
    partition.insert_task_sorted(task);
    Ok(MoveOutcome {
        from,
        to,
        kind: MoveKind::Renumber,
        message: format!("Moved task {src} to {dst}"),
    })
}

/// task -> subtask. Only childless tasks can be demoted.
fn demote(
    partition: &mut TagPartition,
    tag: &str,
    src: u32,
    parent: u32,
    subtask: u32,
) -> Result<MoveOutcome, StoreError> {
    let from = EntityId::Task(src);
    let to = EntityId::Subtask { parent, subtask };
    let task = partition.task(src).ok_or_else(|| source_not_found(from, tag))?;
    if !task.subtasks.is_empty() {
        return Err(StoreError::HasSubtasks {
            task_id: src,
            count: task.subtasks.len(),
        });
    }
    if parent == src {
        return Err(StoreError::InvalidMove {
            reason: format!("cannot move task {src} under itself"),
        });
    }
    let target = partition.task(parent).ok_or_else(|| parent_not_found(parent, tag))?;
    if target.has_subtask(subtask) {
        return Err(destination_exists(to, tag));
    }

    let task = partition
        .remove_task(src)
        .ok_or_else(|| source_not_found(from, tag))?;
    partition
        .task_mut(parent)
        .ok_or_else(|| parent_not_found(parent, tag))?
        .insert_subtask(Subtask::from_task(task, subtask, parent));
    Ok(MoveOutcome {
        from,
        to,
        kind: MoveKind::Demote,
        message: format!("Converted task {src} to subtask {to}"),
    })
}

/// subtask -> task. References to the former siblings collapse onto the
/// former parent.
fn promote(
    partition: &mut TagPartition,
    tag: &str,
    parent: u32,
    subtask: u32,
    dst: u32,
) -> Result<MoveOutcome, StoreError> {
    let from = EntityId::Subtask { parent, subtask };
    let to = EntityId::Task(dst);
    let parent_task = partition.task(parent).ok_or_else(|| source_not_found(from, tag))?;
    let moving = parent_task
        .subtask(subtask)
        .ok_or_else(|| source_not_found(from, tag))?;
    if partition.contains_task(dst) {
        return Err(destination_exists(to, tag));
    }
    let dependencies = promote_dependencies(&moving.dependencies, parent, &parent_task.subtask_ids());

    let moving = partition
        .task_mut(parent)
        .and_then(|t| t.remove_subtask(subtask))
        .ok_or_else(|| source_not_found(from, tag))?;
    partition.insert_task_sorted(Task::from_subtask(moving, dst, dependencies));
    Ok(MoveOutcome {
        from,
        to,
        kind: MoveKind::Promote,
        message: format!("Converted subtask {from} to task {dst}"),
    })
}

/// subtask -> subtask, under the same or another parent.
fn relocate(
    partition: &mut TagPartition,
    tag: &str,
    (old_parent, old_id): (u32, u32),
    (new_parent, new_id): (u32, u32),
) -> Result<MoveOutcome, StoreError> {
    let from = EntityId::Subtask {
        parent: old_parent,
        subtask: old_id,
    };
    let to = EntityId::Subtask {
        parent: new_parent,
        subtask: new_id,
    };
    let source_parent = partition
        .task(old_parent)
        .ok_or_else(|| source_not_found(from, tag))?;
    if !source_parent.has_subtask(old_id) {
        return Err(source_not_found(from, tag));
    }
    let target = partition
        .task(new_parent)
        .ok_or_else(|| parent_not_found(new_parent, tag))?;
    if target.has_subtask(new_id) {
        return Err(destination_exists(to, tag));
    }

    let mut moving = partition
        .task_mut(old_parent)
        .and_then(|t| t.remove_subtask(old_id))
        .ok_or_else(|| source_not_found(from, tag))?;
    moving.dependencies = relocate_dependencies(&moving.dependencies, old_parent, new_parent);
    moving.id = new_id;
    moving.parent_task_id = Some(new_parent);
    partition
        .task_mut(new_parent)
        .ok_or_else(|| parent_not_found(new_parent, tag))?
        .insert_subtask(moving);
    Ok(MoveOutcome {
        from,
        to,
        kind: MoveKind::Relocate,
        message: format!("Moved subtask {from} to {to}"),
    })
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{engine, now, promotion_store, store_with};
    use super::*;
    use crate::domain::{DependencyValue, MASTER_TAG};
    use crate::graph::DependencyGraph;
    use rstest::rstest;

    fn master(store: &TaggedStore) -> &TagPartition {
        store.tag(MASTER_TAG).unwrap()
    }

    fn simple_store() -> TaggedStore {
        store_with(
            MASTER_TAG,
            vec![
                Task::new(1, "one"),
                Task::new(2, "two").with_dependencies([1u32]),
                Task::new(5, "five").with_subtask(Subtask::new(1, "five-one")),
            ],
        )
    }

    #[test]
    fn renumber_leaves_no_dangling_destination() {
        let mut store = simple_store();
        let outcome = engine()
            .move_within_tag(&mut store, MASTER_TAG, "1", "3")
            .unwrap();

        assert_eq!(outcome.kind, MoveKind::Renumber);
        let graph = DependencyGraph::from_partition(master(&store));
        assert!(graph.exists(EntityId::Task(3)));
        assert!(!graph.exists(EntityId::Task(1)));
        assert_eq!(master(&store).task_ids(), vec![2, 3, 5]);
        assert_eq!(master(&store).metadata.updated, now());
    }

    #[test]
    fn renumber_keeps_stale_references_of_other_tasks() {
        let mut store = simple_store();
        engine()
            .move_within_tag(&mut store, MASTER_TAG, "1", "3")
            .unwrap();
        assert_eq!(
            master(&store).task(2).unwrap().dependencies,
            vec![DependencyValue::Number(1)]
        );
    }

    #[rstest]
    #[case("3", "3")]
    #[case("5.1", "5.1")]
    fn self_move_is_rejected(#[case] from: &str, #[case] to: &str) {
        let mut store = simple_store();
        let before = store.clone();
        let err = engine()
            .move_within_tag(&mut store, MASTER_TAG, from, to)
            .unwrap_err();
        assert!(matches!(err, StoreError::SameSourceAndDestination { .. }));
        assert_eq!(store, before);
    }

    #[rstest]
    #[case("abc", "2")]
    #[case("1", "2.x")]
    #[case("0", "2")]
    fn malformed_ids_fail_before_touching_the_store(#[case] from: &str, #[case] to: &str) {
        let mut store = simple_store();
        let err = engine()
            .move_within_tag(&mut store, MASTER_TAG, from, to)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidIdFormat { .. }));
    }

    #[test]
    fn unknown_tag_is_reported() {
        let mut store = simple_store();
        let err = engine()
            .move_within_tag(&mut store, "nope", "1", "3")
            .unwrap_err();
        assert!(matches!(err, StoreError::TagNotFound { .. }));
    }

    #[rstest]
    #[case("2.1")]
    #[case("99.1")]
    #[case("5.7")]
    fn task_with_subtasks_cannot_be_demoted(#[case] destination: &str) {
        let mut store = simple_store();
        let err = engine()
            .move_within_tag(&mut store, MASTER_TAG, "5", destination)
            .unwrap_err();
        assert!(matches!(err, StoreError::HasSubtasks { task_id: 5, count: 1 }));
        assert_eq!(
            err.to_string(),
            "cannot move task 5 with 1 subtasks to subtask position"
        );
    }

    #[test]
    fn demotion_carries_dependencies_unchanged() {
        let mut store = simple_store();
        let outcome = engine()
            .move_within_tag(&mut store, MASTER_TAG, "2", "5.2")
            .unwrap();
        assert_eq!(outcome.kind, MoveKind::Demote);

        let parent = master(&store).task(5).unwrap();
        let demoted = parent.subtask(2).unwrap();
        assert_eq!(demoted.title, "two");
        assert_eq!(demoted.dependencies, vec![DependencyValue::Number(1)]);
        assert_eq!(demoted.parent_task_id, Some(5));
        assert!(!master(&store).contains_task(2));
    }

    #[test]
    fn demotion_under_itself_is_invalid() {
        let mut store = simple_store();
        let err = engine()
            .move_within_tag(&mut store, MASTER_TAG, "1", "1.1")
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidMove { .. }));
    }

    #[test]
    fn promotion_rewrites_sibling_refs_to_former_parent() {
        let mut store = promotion_store();
        let outcome = engine()
            .move_within_tag(&mut store, MASTER_TAG, "16.9", "21")
            .unwrap();
        assert_eq!(outcome.kind, MoveKind::Promote);

        let promoted = master(&store).task(21).unwrap();
        assert_eq!(
            promoted.dependencies,
            vec![DependencyValue::Number(16), DependencyValue::Number(20)]
        );
        assert!(promoted.subtasks.is_empty());
        assert_eq!(master(&store).task(16).unwrap().subtask_ids(), vec![1, 2, 3]);
        assert_eq!(master(&store).task_ids(), vec![15, 16, 20, 21]);
    }

    #[test]
    fn promotion_into_taken_id_fails() {
        let mut store = promotion_store();
        let err = engine()
            .move_within_tag(&mut store, MASTER_TAG, "16.9", "20")
            .unwrap_err();
        assert!(matches!(err, StoreError::DestinationExists { .. }));
    }

    #[test]
    fn cross_parent_move_rewrites_qualified_refs() {
        let mut store = store_with(
            MASTER_TAG,
            vec![
                Task::new(1, "one")
                    .with_subtask(Subtask::new(1, "a").with_dependencies(["1.2"]))
                    .with_subtask(Subtask::new(2, "b")),
                Task::new(2, "two"),
            ],
        );
        let outcome = engine()
            .move_within_tag(&mut store, MASTER_TAG, "1.1", "2.1")
            .unwrap();
        assert_eq!(outcome.kind, MoveKind::Relocate);

        let moved = master(&store).task(2).unwrap().subtask(1).unwrap();
        assert_eq!(moved.dependencies, vec![DependencyValue::Text("2.2".to_string())]);
        assert_eq!(moved.parent_task_id, Some(2));
        assert_eq!(master(&store).task(1).unwrap().subtask_ids(), vec![2]);
    }

    #[test]
    fn relocation_reports_missing_pieces() {
        let mut store = promotion_store();
        let engine = engine();
        assert!(matches!(
            engine.move_within_tag(&mut store, MASTER_TAG, "16.4", "20.1"),
            Err(StoreError::SourceNotFound { .. })
        ));
        assert!(matches!(
            engine.move_within_tag(&mut store, MASTER_TAG, "16.1", "30.1"),
            Err(StoreError::DestinationParentNotFound { parent_id: 30, .. })
        ));
        assert!(matches!(
            engine.move_within_tag(&mut store, MASTER_TAG, "16.1", "16.2"),
            Err(StoreError::DestinationExists { .. })
        ));
        assert!(matches!(
            engine.move_within_tag(&mut store, MASTER_TAG, "7", "8"),
            Err(StoreError::SourceNotFound { .. })
        ));
    }

    #[rstest]
    #[case(vec!["1"], vec![])]
    #[case(vec!["1", "2"], vec!["3"])]
    #[case(vec![], vec!["3", "4"])]
    fn batch_lengths_must_match(#[case] from: Vec<&str>, #[case] to: Vec<&str>) {
        let mut store = simple_store();
        let err = engine()
            .move_batch_within_tag(&mut store, MASTER_TAG, &from, &to)
            .unwrap_err();
        assert!(matches!(err, StoreError::CountMismatch { .. }));
    }

    #[test]
    fn batch_applies_every_pair() {
        let mut store = simple_store();
        let outcome = engine()
            .move_batch_within_tag(&mut store, MASTER_TAG, &["1", "2"], &["3", "4"])
            .unwrap();
        assert_eq!(outcome.moves.len(), 2);
        assert_eq!(master(&store).task_ids(), vec![3, 4, 5]);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let mut store = simple_store();
        let before = store.clone();
        let err = engine()
            .move_batch_within_tag(&mut store, MASTER_TAG, &["1", "2"], &["3", "5"])
            .unwrap_err();
        assert!(matches!(err, StoreError::DestinationExists { .. }));
        assert_eq!(store, before);
    }

    #[test]
    fn move_that_closes_a_cycle_is_rejected() {
        let mut store = store_with(
            MASTER_TAG,
            vec![
                Task::new(1, "one").with_dependencies([5u32]),
                Task::new(2, "two").with_dependencies([1u32]),
            ],
        );
        let before = store.clone();
        let err = engine()
            .move_within_tag(&mut store, MASTER_TAG, "2", "5")
            .unwrap_err();
        match err {
            StoreError::DependencyCycle { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"5".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store, before);
    }

    #[test]
    fn existing_cycle_does_not_block_unrelated_moves() {
        let mut store = store_with(
            MASTER_TAG,
            vec![
                Task::new(1, "one").with_dependencies([2u32]),
                Task::new(2, "two").with_dependencies([1u32]),
                Task::new(3, "three"),
            ],
        );
        engine()
            .move_within_tag(&mut store, MASTER_TAG, "3", "4")
            .unwrap();
        assert!(master(&store).contains_task(4));
    }
}
