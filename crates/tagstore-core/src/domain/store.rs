//! The tagged document: `{ tag -> { tasks, metadata } }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::dependency::null_as_empty;
use super::errors::StoreError;
use super::task::Task;

/// Name of the permanent fallback tag.
pub const MASTER_TAG: &str = "master";

/// Tag names are non-empty and use ASCII letters, digits, `-` and `_` only.
pub fn validate_tag_name(name: &str) -> Result<(), StoreError> {
    let reason = if name.is_empty() {
        "tag name must not be empty"
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        "only letters, digits, '-' and '_' are allowed"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidTagName {
        tag: name.to_string(),
        reason: reason.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMetadata {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TagMetadata {
    pub fn new(now: DateTime<Utc>, description: Option<String>) -> Self {
        Self {
            created: now,
            updated: now,
            description,
            extra: Map::new(),
        }
    }
}

/// One tag's tasks, kept in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPartition {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tasks: Vec<Task>,
    pub metadata: TagMetadata,
}

impl TagPartition {
    pub fn new(now: DateTime<Utc>, description: Option<String>) -> Self {
        Self {
            tasks: Vec::new(),
            metadata: TagMetadata::new(now, description),
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn task(&self, id: u32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: u32) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn contains_task(&self, id: u32) -> bool {
        self.task(id).is_some()
    }

    pub fn task_ids(&self) -> Vec<u32> {
        self.tasks.iter().map(|t| t.id).collect()
    }

    pub fn remove_task(&mut self, id: u32) -> Option<Task> {
        let at = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(at))
    }

    /// Insert before the first task with a larger id.
    pub fn insert_task_sorted(&mut self, task: Task) {
        let at = self
            .tasks
            .iter()
            .position(|t| t.id > task.id)
            .unwrap_or(self.tasks.len());
        self.tasks.insert(at, task);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.metadata.updated = now;
    }
}

/// The whole document. Serialized as a plain JSON object keyed by tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaggedStore {
    tags: BTreeMap<String, TagPartition>,
}

impl TaggedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document containing only an empty `master` tag.
    pub fn with_master(now: DateTime<Utc>) -> Self {
        let mut store = Self::new();
        store.insert_tag(
            MASTER_TAG,
            TagPartition::new(now, Some("Tasks for master context".to_string())),
        );
        store
    }

    pub fn tag(&self, name: &str) -> Option<&TagPartition> {
        self.tags.get(name)
    }

    pub fn tag_mut(&mut self, name: &str) -> Option<&mut TagPartition> {
        self.tags.get_mut(name)
    }

    pub fn contains_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }

    pub fn tags(&self) -> impl Iterator<Item = (&String, &TagPartition)> {
        self.tags.iter()
    }

    pub fn insert_tag(&mut self, name: impl Into<String>, partition: TagPartition) -> Option<TagPartition> {
        self.tags.insert(name.into(), partition)
    }

    pub fn remove_tag(&mut self, name: &str) -> Option<TagPartition> {
        self.tags.remove(name)
    }

    /// Get a tag, creating an empty partition if it does not exist.
    pub fn ensure_tag(&mut self, name: &str, now: DateTime<Utc>) -> &mut TagPartition {
        self.tags
            .entry(name.to_string())
            .or_insert_with(|| TagPartition::new(now, None))
    }
}
