//! Dependency references.
//!
//! On disk a dependency is either a bare integer or a string. A bare integer is
//! ambiguous: inside a subtask's list it names a sibling subtask when a sibling
//! with that id exists, otherwise a top-level task. Inside a task's list it is
//! always a task id. [`DependencyRef`] is the resolved form; resolution happens
//! once, with the owning entity's [`DependencyScope`].

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::ids::EntityId;

/// A dependency entry exactly as stored in the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyValue {
    Number(u32),
    Text(String),
}

impl fmt::Display for DependencyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyValue::Number(n) => write!(f, "{n}"),
            DependencyValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<u32> for DependencyValue {
    fn from(n: u32) -> Self {
        DependencyValue::Number(n)
    }
}

impl From<&str> for DependencyValue {
    fn from(s: &str) -> Self {
        DependencyValue::Text(s.to_string())
    }
}

/// Context a dependency list is read in.
#[derive(Debug, Clone, Copy)]
pub enum DependencyScope<'a> {
    /// The list belongs to a top-level task.
    Task,
    /// The list belongs to a subtask of `parent_id` whose siblings (itself
    /// included) have `sibling_ids`.
    Subtask {
        parent_id: u32,
        sibling_ids: &'a [u32],
    },
}

/// A dependency with its meaning fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyRef {
    /// Bare integer naming a subtask under the same parent.
    Sibling(u32),
    /// Explicit `"P.S"` reference.
    Qualified { parent: u32, subtask: u32 },
    /// Top-level task id.
    Task(u32),
}

impl DependencyRef {
    /// Resolve a stored value. Returns `None` for text that is not an id;
    /// such entries are kept verbatim and ignored by graph queries.
    pub fn resolve(value: &DependencyValue, scope: DependencyScope<'_>) -> Option<Self> {
        let id = match value {
            DependencyValue::Number(n) => EntityId::Task(*n),
            DependencyValue::Text(s) => EntityId::parse(s).ok()?,
        };
        Some(match (id, scope) {
            (EntityId::Subtask { parent, subtask }, _) => DependencyRef::Qualified { parent, subtask },
            (EntityId::Task(n), DependencyScope::Subtask { sibling_ids, .. })
                if sibling_ids.contains(&n) =>
            {
                DependencyRef::Sibling(n)
            }
            (EntityId::Task(n), _) => DependencyRef::Task(n),
        })
    }

    /// Stored form: siblings and tasks as bare integers, qualified refs as `"P.S"`.
    pub fn to_value(self) -> DependencyValue {
        match self {
            DependencyRef::Sibling(n) | DependencyRef::Task(n) => DependencyValue::Number(n),
            DependencyRef::Qualified { parent, subtask } => {
                DependencyValue::Text(format!("{parent}.{subtask}"))
            }
        }
    }

    /// The top-level task this dependency lands in. `owner_parent` is the
    /// parent of the subtask holding the reference, if any.
    pub fn task_target(self, owner_parent: Option<u32>) -> u32 {
        match self {
            DependencyRef::Sibling(n) => owner_parent.unwrap_or(n),
            DependencyRef::Qualified { parent, .. } => parent,
            DependencyRef::Task(n) => n,
        }
    }

    /// The entity this dependency points at.
    pub fn entity(self, owner_parent: Option<u32>) -> EntityId {
        match (self, owner_parent) {
            (DependencyRef::Sibling(n), Some(parent)) => EntityId::Subtask { parent, subtask: n },
            (DependencyRef::Sibling(n), None) | (DependencyRef::Task(n), _) => EntityId::Task(n),
            (DependencyRef::Qualified { parent, subtask }, _) => EntityId::Subtask { parent, subtask },
        }
    }
}

/// A dependency edge that would cross a tag boundary after a move.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyConflict {
    /// Moving task holding the reference (directly or through a subtask).
    pub task_id: u32,
    /// Task-level id the reference lands on.
    pub dependency_id: u32,
    /// Tag the dependency stays in.
    pub dependency_tag: String,
}

impl fmt::Display for DependencyConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task {} depends on task {} in tag '{}'",
            self.task_id, self.dependency_id, self.dependency_tag
        )
    }
}

/// Treat a JSON `null` list as empty.
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIBLINGS: &[u32] = &[1, 2, 3, 9];

    fn in_subtask() -> DependencyScope<'static> {
        DependencyScope::Subtask {
            parent_id: 16,
            sibling_ids: SIBLINGS,
        }
    }

    #[test]
    fn bare_integer_in_subtask_prefers_sibling() {
        let r = DependencyRef::resolve(&DependencyValue::Number(2), in_subtask());
        assert_eq!(r, Some(DependencyRef::Sibling(2)));
    }

    #[test]
    fn bare_integer_without_matching_sibling_is_a_task() {
        let r = DependencyRef::resolve(&DependencyValue::Number(15), in_subtask());
        assert_eq!(r, Some(DependencyRef::Task(15)));
    }

    #[test]
    fn bare_integer_in_task_is_always_a_task() {
        let r = DependencyRef::resolve(&DependencyValue::Number(2), DependencyScope::Task);
        assert_eq!(r, Some(DependencyRef::Task(2)));
    }

    #[test]
    fn dotted_text_is_qualified_in_any_scope() {
        let v = DependencyValue::from("16.1");
        let expected = Some(DependencyRef::Qualified { parent: 16, subtask: 1 });
        assert_eq!(DependencyRef::resolve(&v, in_subtask()), expected);
        assert_eq!(DependencyRef::resolve(&v, DependencyScope::Task), expected);
    }

    #[test]
    fn numeric_text_resolves_like_a_number() {
        let v = DependencyValue::from("3");
        assert_eq!(
            DependencyRef::resolve(&v, in_subtask()),
            Some(DependencyRef::Sibling(3))
        );
    }

    #[test]
    fn garbage_text_does_not_resolve() {
        let v = DependencyValue::from("soon");
        assert_eq!(DependencyRef::resolve(&v, DependencyScope::Task), None);
    }

    #[test]
    fn stored_form_matches_document_conventions() {
        assert_eq!(DependencyRef::Sibling(4).to_value(), DependencyValue::Number(4));
        assert_eq!(DependencyRef::Task(20).to_value(), DependencyValue::Number(20));
        assert_eq!(
            DependencyRef::Qualified { parent: 2, subtask: 2 }.to_value(),
            DependencyValue::Text("2.2".to_string())
        );
    }

    #[test]
    fn task_target_follows_owner_context() {
        assert_eq!(DependencyRef::Sibling(1).task_target(Some(16)), 16);
        assert_eq!(DependencyRef::Task(20).task_target(Some(16)), 20);
        assert_eq!(
            DependencyRef::Qualified { parent: 7, subtask: 1 }.task_target(None),
            7
        );
    }

    #[test]
    fn mixed_list_deserializes() {
        let values: Vec<DependencyValue> = serde_json::from_str(r#"[1, "16.1", 20]"#).unwrap();
        assert_eq!(
            values,
            vec![
                DependencyValue::Number(1),
                DependencyValue::Text("16.1".to_string()),
                DependencyValue::Number(20),
            ]
        );
    }
}
