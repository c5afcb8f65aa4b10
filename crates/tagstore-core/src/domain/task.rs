//! Task and subtask records as stored in a tag partition.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::dependency::{null_as_empty, DependencyRef, DependencyScope, DependencyValue};

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Cancelled,
    Deferred,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// A top-level task.
///
/// Fields this crate does not model are kept in `extra` and written back
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub test_strategy: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dependencies: Vec<DependencyValue>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subtasks: Vec<Subtask>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A subtask. Its id is unique within the parent only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub test_strategy: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dependencies: Vec<DependencyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            details: String::new(),
            test_strategy: String::new(),
            status: TaskStatus::Pending,
            priority: None,
            dependencies: Vec::new(),
            subtasks: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_dependencies<I, D>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DependencyValue>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_subtask(mut self, subtask: Subtask) -> Self {
        self.insert_subtask(subtask);
        self
    }

    pub fn subtask(&self, id: u32) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    pub fn has_subtask(&self, id: u32) -> bool {
        self.subtask(id).is_some()
    }

    pub fn subtask_ids(&self) -> Vec<u32> {
        self.subtasks.iter().map(|s| s.id).collect()
    }

    /// Insert keeping subtasks ordered by id.
    pub fn insert_subtask(&mut self, subtask: Subtask) {
        let at = self
            .subtasks
            .iter()
            .position(|s| s.id > subtask.id)
            .unwrap_or(self.subtasks.len());
        self.subtasks.insert(at, subtask);
    }

    pub fn remove_subtask(&mut self, id: u32) -> Option<Subtask> {
        let at = self.subtasks.iter().position(|s| s.id == id)?;
        Some(self.subtasks.remove(at))
    }

    /// Resolved view of this task's own dependency list.
    pub fn resolved_dependencies(&self) -> Vec<DependencyRef> {
        self.dependencies
            .iter()
            .filter_map(|d| DependencyRef::resolve(d, DependencyScope::Task))
            .collect()
    }

    /// Promote a subtask: the subtask's content under a new task id, no children.
    pub fn from_subtask(subtask: Subtask, id: u32, dependencies: Vec<DependencyValue>) -> Self {
        Self {
            id,
            title: subtask.title,
            description: subtask.description,
            details: subtask.details,
            test_strategy: subtask.test_strategy,
            status: subtask.status,
            priority: subtask.priority,
            dependencies,
            subtasks: Vec::new(),
            extra: subtask.extra,
        }
    }
}

impl Subtask {
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            details: String::new(),
            test_strategy: String::new(),
            status: TaskStatus::Pending,
            priority: None,
            dependencies: Vec::new(),
            parent_task_id: None,
            extra: Map::new(),
        }
    }

    pub fn with_dependencies<I, D>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DependencyValue>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Resolved view of this subtask's dependencies under `parent`.
    pub fn resolved_dependencies(&self, parent: &Task) -> Vec<DependencyRef> {
        let siblings = parent.subtask_ids();
        let scope = DependencyScope::Subtask {
            parent_id: parent.id,
            sibling_ids: &siblings,
        };
        self.dependencies
            .iter()
            .filter_map(|d| DependencyRef::resolve(d, scope))
            .collect()
    }

    /// Demote a childless task into a subtask of `parent`. Dependencies are
    /// carried over as stored.
    pub fn from_task(task: Task, id: u32, parent: u32) -> Self {
        Self {
            id,
            title: task.title,
            description: task.description,
            details: task.details,
            test_strategy: task.test_strategy,
            status: task.status,
            priority: task.priority,
            dependencies: task.dependencies,
            parent_task_id: Some(parent),
            extra: task.extra,
        }
    }
}
