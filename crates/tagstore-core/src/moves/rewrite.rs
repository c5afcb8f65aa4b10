//! Dependency rewrite rules applied when a subtask changes place.

use crate::domain::{DependencyRef, DependencyScope, DependencyValue};

/// Dependencies of a subtask of `parent_id` that is being promoted to a task.
///
/// References to the former siblings (bare sibling ids, or `"parent.N"`)
/// collapse to the bare parent id: the new task depends on the whole former
/// parent. Everything else is kept as stored. Duplicates produced by the
/// collapse are dropped, first occurrence wins.
pub fn promote_dependencies(
    deps: &[DependencyValue],
    parent_id: u32,
    sibling_ids: &[u32],
) -> Vec<DependencyValue> {
    let scope = DependencyScope::Subtask {
        parent_id,
        sibling_ids,
    };
    let mut out: Vec<DependencyValue> = Vec::with_capacity(deps.len());
    for value in deps {
        let rewritten = match DependencyRef::resolve(value, scope) {
            Some(DependencyRef::Sibling(_)) => DependencyValue::Number(parent_id),
            Some(DependencyRef::Qualified { parent, .. }) if parent == parent_id => {
                DependencyValue::Number(parent_id)
            }
            _ => value.clone(),
        };
        if !out.contains(&rewritten) {
            out.push(rewritten);
        }
    }
    out
}

/// Dependencies of a subtask moving from `old_parent` to `new_parent`.
///
/// Only qualified references to the old parent follow the move
/// (`"old.N"` -> `"new.N"`); bare values are left exactly as stored.
pub fn relocate_dependencies(
    deps: &[DependencyValue],
    old_parent: u32,
    new_parent: u32,
) -> Vec<DependencyValue> {
    deps.iter()
        .map(|value| match DependencyRef::resolve(value, DependencyScope::Task) {
            Some(DependencyRef::Qualified { parent, subtask }) if parent == old_parent => {
                DependencyRef::Qualified {
                    parent: new_parent,
                    subtask,
                }
                .to_value()
            }
            _ => value.clone(),
        })
        .collect()
}
