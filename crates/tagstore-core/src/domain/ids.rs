//! Identifiers: task/subtask ids as they appear in requests, and lease ids.
//!
//! Task ids are positive integers unique within a tag. Subtask ids are positive
//! integers unique within their parent task, and are addressed from outside as
//! `"P.S"` (subtask `S` of task `P`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use super::errors::StoreError;

/// Which scope an [`EntityId`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Task,
    Subtask,
}

/// A parsed task or subtask identifier.
///
/// Ordering is by task id first, then subtask id, so that `3 < 3.1 < 3.2 < 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EntityId {
    Task(u32),
    Subtask { parent: u32, subtask: u32 },
}

impl EntityId {
    /// Parse a raw id: a positive integer, or `"int.int"`.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim();
        let invalid = || StoreError::InvalidIdFormat {
            raw: raw.to_string(),
        };

        match trimmed.split_once('.') {
            None => parse_positive(trimmed).map(EntityId::Task).ok_or_else(invalid),
            Some((parent, subtask)) => {
                let parent = parse_positive(parent).ok_or_else(invalid)?;
                let subtask = parse_positive(subtask).ok_or_else(invalid)?;
                Ok(EntityId::Subtask { parent, subtask })
            }
        }
    }

    pub fn kind(&self) -> IdKind {
        match self {
            EntityId::Task(_) => IdKind::Task,
            EntityId::Subtask { .. } => IdKind::Subtask,
        }
    }

    /// The top-level task id (the parent, for a subtask).
    pub fn task_id(&self) -> u32 {
        match *self {
            EntityId::Task(id) => id,
            EntityId::Subtask { parent, .. } => parent,
        }
    }

    pub fn subtask_id(&self) -> Option<u32> {
        match *self {
            EntityId::Task(_) => None,
            EntityId::Subtask { subtask, .. } => Some(subtask),
        }
    }

    pub fn is_subtask(&self) -> bool {
        matches!(self, EntityId::Subtask { .. })
    }
}

impl Ord for EntityId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.task_id(), self.subtask_id()).cmp(&(other.task_id(), other.subtask_id()))
    }
}

impl PartialOrd for EntityId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Free-function form used by request handlers.
pub fn parse_id(raw: &str) -> Result<EntityId, StoreError> {
    EntityId::parse(raw)
}

fn parse_positive(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u32>().ok().filter(|&n| n > 0)
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Task(id) => write!(f, "{id}"),
            EntityId::Subtask { parent, subtask } => write!(f, "{parent}.{subtask}"),
        }
    }
}

impl FromStr for EntityId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityId::parse(s)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for EntityId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        EntityId::parse(&value)
    }
}

/// Identifier of a tag lease.
///
/// ULID based so ids sort by acquisition time; rendered as `lock-<ulid>`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockId(Ulid);

impl LockId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for LockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", EntityId::Task(1))]
    #[case(" 42 ", EntityId::Task(42))]
    #[case("16.9", EntityId::Subtask { parent: 16, subtask: 9 })]
    #[case("2.1", EntityId::Subtask { parent: 2, subtask: 1 })]
    fn parses_valid_ids(#[case] raw: &str, #[case] expected: EntityId) {
        assert_eq!(EntityId::parse(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("0")]
    #[case("-3")]
    #[case("+3")]
    #[case("1.")]
    #[case(".1")]
    #[case("1.2.3")]
    #[case("1.0")]
    #[case("1.x")]
    #[case("99999999999")]
    fn rejects_malformed_ids(#[case] raw: &str) {
        let err = EntityId::parse(raw).unwrap_err();
        assert!(matches!(err, StoreError::InvalidIdFormat { .. }), "{raw}: {err}");
    }

    #[rstest]
    #[case("7")]
    #[case("7.3")]
    #[case(" 12.04 ")]
    fn parsing_is_idempotent_through_display(#[case] raw: &str) {
        let once = parse_id(raw).unwrap();
        let twice = parse_id(&once.to_string()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn accessors_report_scope() {
        let id = EntityId::parse("5.2").unwrap();
        assert_eq!(id.kind(), IdKind::Subtask);
        assert_eq!(id.task_id(), 5);
        assert_eq!(id.subtask_id(), Some(2));

        let id = EntityId::parse("5").unwrap();
        assert_eq!(id.kind(), IdKind::Task);
        assert_eq!(id.subtask_id(), None);
        assert!(!id.is_subtask());
    }

    #[test]
    fn ordering_places_subtasks_after_parent() {
        let mut ids = vec![
            EntityId::Task(4),
            EntityId::Subtask { parent: 3, subtask: 2 },
            EntityId::Task(3),
            EntityId::Subtask { parent: 3, subtask: 1 },
        ];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["3", "3.1", "3.2", "4"]);
    }

    #[test]
    fn entity_id_serializes_as_string() {
        let id = EntityId::Subtask { parent: 1, subtask: 2 };
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"1.2\"");
        let back: EntityId = serde_json::from_str("\"1.2\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn lock_ids_are_unique_and_prefixed() {
        let a = LockId::new();
        let b = LockId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("lock-"));
    }
}
