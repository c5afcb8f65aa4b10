//! Errors - エラー型と分類
//!
//! Every failure the core can report is a [`StoreError`] variant carrying the
//! ids, counts or timings a caller needs to correct itself. Callers branch on
//! [`StoreError::code`] / [`StoreError::kind`], never on message text.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use super::dependency::DependencyConflict;

/// Operational classification of an error.
///
/// - Validation / NotFound / Conflict: client errors, never retried
/// - Contention / Unavailable / Transient: worth retrying later
/// - Permission: environment problem, never retried
/// - Corruption: handed to the self-healing auditor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Contention,
    Unavailable,
    Transient,
    Permission,
    Corruption,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid id format: '{raw}' (expected a positive integer or \"parent.subtask\")")]
    InvalidIdFormat { raw: String },

    #[error("source and destination are the same: {id}")]
    SameSourceAndDestination { id: String },

    #[error("source {id} not found in tag '{tag}'")]
    SourceNotFound { id: String, tag: String },

    #[error("destination parent task {parent_id} not found in tag '{tag}'")]
    DestinationParentNotFound { parent_id: u32, tag: String },

    #[error("destination {id} already exists in tag '{tag}'")]
    DestinationExists { id: String, tag: String },

    #[error("number of source ids ({sources}) must match number of destination ids ({destinations})")]
    CountMismatch { sources: usize, destinations: usize },

    #[error("cannot move task {task_id} with {count} subtasks to subtask position")]
    HasSubtasks { task_id: u32, count: usize },

    #[error("invalid move: {reason}")]
    InvalidMove { reason: String },

    #[error("move would create a dependency cycle: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("tag '{tag}' not found")]
    TagNotFound { tag: String },

    #[error("tag '{tag}' already exists")]
    TagExists { tag: String },

    #[error("source and target tags are the same: '{tag}'")]
    SameTag { tag: String },

    #[error("invalid tag name '{tag}': {reason}")]
    InvalidTagName { tag: String, reason: String },

    #[error("tag '{tag}' is protected")]
    ProtectedTag { tag: String },

    #[error("task {task_id} not found in tag '{tag}'")]
    TaskNotFound { task_id: u32, tag: String },

    #[error("task {task_id} already exists in tag '{tag}'")]
    TaskIdConflict { task_id: u32, tag: String },

    #[error("invalid options: {reason}")]
    InvalidOptions { reason: String },

    #[error(
        "cannot move tasks from '{source_tag}' to '{target_tag}': {} cross-tag dependency conflict(s): {}",
        conflicts.len(),
        conflict_pairs(conflicts)
    )]
    CrossTagDependencyConflict {
        source_tag: String,
        target_tag: String,
        conflicts: Vec<DependencyConflict>,
    },

    #[error("cannot move subtask {id} across tags; promote it to a task first")]
    SubtaskCrossTagMove { id: String },

    #[error("timed out after {waited_ms}ms waiting for lock on tag '{tag}' (held by {holder:?})")]
    LockTimeout {
        tag: String,
        waited_ms: u64,
        holder: Option<String>,
    },

    #[error("circuit '{breaker}' is open; next attempt allowed at {retry_at}")]
    CircuitOpen {
        breaker: String,
        retry_at: DateTime<Utc>,
    },

    #[error("operation failed after {attempts} attempt(s): {last}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        last: Box<StoreError>,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("tasks document {} is corrupt: {reason}", path.display())]
    CorruptDocument { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{name} failed (status {status:?}): {message}")]
    Upstream {
        name: String,
        status: Option<u16>,
        message: String,
    },

    #[error("service unavailable: {reason}")]
    Unavailable { reason: String },
}

fn conflict_pairs(conflicts: &[DependencyConflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("{}->{}", c.task_id, c.dependency_id))
        .collect::<Vec<_>>()
        .join(", ")
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidIdFormat { .. } => "INVALID_ID_FORMAT",
            StoreError::SameSourceAndDestination { .. } => "SAME_SOURCE_AND_DESTINATION",
            StoreError::SourceNotFound { .. } => "SOURCE_NOT_FOUND",
            StoreError::DestinationParentNotFound { .. } => "DESTINATION_PARENT_NOT_FOUND",
            StoreError::DestinationExists { .. } => "DESTINATION_EXISTS",
            StoreError::CountMismatch { .. } => "COUNT_MISMATCH",
            StoreError::HasSubtasks { .. } => "HAS_SUBTASKS",
            StoreError::InvalidMove { .. } => "INVALID_MOVE",
            StoreError::DependencyCycle { .. } => "DEPENDENCY_CYCLE",
            StoreError::TagNotFound { .. } => "TAG_NOT_FOUND",
            StoreError::TagExists { .. } => "TAG_EXISTS",
            StoreError::SameTag { .. } => "SAME_TAG",
            StoreError::InvalidTagName { .. } => "INVALID_TAG_NAME",
            StoreError::ProtectedTag { .. } => "PROTECTED_TAG",
            StoreError::TaskNotFound { .. } => "TASK_NOT_FOUND",
            StoreError::TaskIdConflict { .. } => "TASK_ID_CONFLICT",
            StoreError::InvalidOptions { .. } => "INVALID_OPTIONS",
            StoreError::CrossTagDependencyConflict { .. } => "CROSS_TAG_DEPENDENCY_CONFLICT",
            StoreError::SubtaskCrossTagMove { .. } => "SUBTASK_CROSS_TAG_MOVE",
            StoreError::LockTimeout { .. } => "LOCK_TIMEOUT",
            StoreError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            StoreError::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
            StoreError::Io { source, .. } => match source.kind() {
                std::io::ErrorKind::PermissionDenied => "PERMISSION_DENIED",
                std::io::ErrorKind::NotADirectory => "NOT_A_DIRECTORY",
                std::io::ErrorKind::NotFound => "FILE_NOT_FOUND",
                _ => "IO_ERROR",
            },
            StoreError::CorruptDocument { .. } => "CORRUPT_DOCUMENT",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
            StoreError::Upstream { .. } => "UPSTREAM_ERROR",
            StoreError::Unavailable { .. } => "UNAVAILABLE",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidIdFormat { .. }
            | StoreError::SameSourceAndDestination { .. }
            | StoreError::CountMismatch { .. }
            | StoreError::HasSubtasks { .. }
            | StoreError::InvalidMove { .. }
            | StoreError::DependencyCycle { .. }
            | StoreError::SameTag { .. }
            | StoreError::InvalidTagName { .. }
            | StoreError::ProtectedTag { .. }
            | StoreError::InvalidOptions { .. }
            | StoreError::SubtaskCrossTagMove { .. }
            | StoreError::Serialization(_) => ErrorKind::Validation,
            StoreError::SourceNotFound { .. }
            | StoreError::DestinationParentNotFound { .. }
            | StoreError::TagNotFound { .. }
            | StoreError::TaskNotFound { .. } => ErrorKind::NotFound,
            StoreError::DestinationExists { .. }
            | StoreError::TagExists { .. }
            | StoreError::TaskIdConflict { .. }
            | StoreError::CrossTagDependencyConflict { .. } => ErrorKind::Conflict,
            StoreError::LockTimeout { .. } => ErrorKind::Contention,
            StoreError::CircuitOpen { .. } | StoreError::Unavailable { .. } => ErrorKind::Unavailable,
            StoreError::MaxRetriesExceeded { last, .. } => last.kind(),
            StoreError::Io { source, .. } => match source.kind() {
                std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::NotADirectory => {
                    ErrorKind::Permission
                }
                _ => ErrorKind::Transient,
            },
            StoreError::CorruptDocument { .. } => ErrorKind::Corruption,
            StoreError::Upstream { status, .. } => match status {
                Some(408) | Some(429) | None => ErrorKind::Transient,
                Some(s) if (400..500).contains(s) => ErrorKind::Validation,
                Some(_) => ErrorKind::Transient,
            },
        }
    }

    /// Client errors: the request itself is wrong and repeating it cannot help.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict
        )
    }

    /// Status the route layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            StoreError::Upstream { status: Some(s), .. } => *s,
            StoreError::MaxRetriesExceeded { .. } => 503,
            _ => match self.kind() {
                ErrorKind::Validation => 400,
                ErrorKind::NotFound => 404,
                ErrorKind::Conflict => 409,
                ErrorKind::Contention => 423,
                ErrorKind::Unavailable => 503,
                ErrorKind::Permission => 403,
                ErrorKind::Transient | ErrorKind::Corruption => 500,
            },
        }
    }
}
