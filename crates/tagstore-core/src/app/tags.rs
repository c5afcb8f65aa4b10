//! Tag administration: create, copy, rename, delete.
//!
//! Each operation leases every tag it touches, so it never interleaves with a
//! move on the same tag. `master` cannot be renamed or deleted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::service::{TaskService, STORE_BREAKER};
use crate::domain::{validate_tag_name, StoreError, TagPartition, TaggedStore, MASTER_TAG};

/// Summary of one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSummary {
    pub name: String,
    pub task_count: usize,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TagSummary {
    fn of(name: &str, partition: &TagPartition) -> Self {
        Self {
            name: name.to_string(),
            task_count: partition.tasks.len(),
            created: partition.metadata.created,
            updated: partition.metadata.updated,
            description: partition.metadata.description.clone(),
        }
    }
}

fn protect(tag: &str) -> Result<(), StoreError> {
    if tag == MASTER_TAG {
        return Err(StoreError::ProtectedTag {
            tag: tag.to_string(),
        });
    }
    Ok(())
}

fn require<'a>(doc: &'a TaggedStore, tag: &str) -> Result<&'a TagPartition, StoreError> {
    doc.tag(tag).ok_or_else(|| StoreError::TagNotFound {
        tag: tag.to_string(),
    })
}

fn require_absent(doc: &TaggedStore, tag: &str) -> Result<(), StoreError> {
    if doc.contains_tag(tag) {
        return Err(StoreError::TagExists {
            tag: tag.to_string(),
        });
    }
    Ok(())
}

impl TaskService {
    /// Every tag, ordered by name.
    pub async fn list_tags(&self) -> Result<Vec<TagSummary>, StoreError> {
        let doc = self.snapshot().await?;
        Ok(doc
            .tags()
            .map(|(name, partition)| TagSummary::of(name, partition))
            .collect())
    }

    /// Create an empty tag.
    pub async fn create_tag(&self, name: &str, description: Option<&str>) -> Result<TagSummary, StoreError> {
        validate_tag_name(name)?;
        self.resilience
            .execute(STORE_BREAKER, || async move {
                let _lease = self.lease(&[name], "create-tag").await?;
                let _gate = self.gate().await;
                let mut doc = self.read_snapshot().await?;
                require_absent(&doc, name)?;

                let description = description
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Tasks for {name} context"));
                let partition = TagPartition::new(self.clock.now(), Some(description));
                let summary = TagSummary::of(name, &partition);
                doc.insert_tag(name, partition);
                self.store.write(&doc).await?;
                info!(tag = name, "created tag");
                Ok::<_, StoreError>(summary)
            })
            .await
    }

    /// Copy `source` with all of its tasks into a new tag `target`.
    pub async fn copy_tag(
        &self,
        source: &str,
        target: &str,
        description: Option<&str>,
    ) -> Result<TagSummary, StoreError> {
        validate_tag_name(target)?;
        self.resilience
            .execute(STORE_BREAKER, || async move {
                let _lease = self.lease(&[source, target], "copy-tag").await?;
                let _gate = self.gate().await;
                let mut doc = self.read_snapshot().await?;
                let tasks = require(&doc, source)?.tasks.clone();
                require_absent(&doc, target)?;

                let description = description
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Copy of {source}"));
                let partition = TagPartition::new(self.clock.now(), Some(description)).with_tasks(tasks);
                let summary = TagSummary::of(target, &partition);
                doc.insert_tag(target, partition);
                self.store.write(&doc).await?;
                info!(source, target, tasks = summary.task_count, "copied tag");
                Ok::<_, StoreError>(summary)
            })
            .await
    }

    /// Rename `old` to `new`, keeping tasks and metadata.
    pub async fn rename_tag(&self, old: &str, new: &str) -> Result<TagSummary, StoreError> {
        protect(old)?;
        validate_tag_name(new)?;
        self.resilience
            .execute(STORE_BREAKER, || async move {
                let _lease = self.lease(&[old, new], "rename-tag").await?;
                let _gate = self.gate().await;
                let mut doc = self.read_snapshot().await?;
                require(&doc, old)?;
                require_absent(&doc, new)?;

                let mut partition = doc.remove_tag(old).ok_or_else(|| StoreError::TagNotFound {
                    tag: old.to_string(),
                })?;
                partition.touch(self.clock.now());
                let summary = TagSummary::of(new, &partition);
                doc.insert_tag(new, partition);
                self.store.write(&doc).await?;
                info!(old, new, "renamed tag");
                Ok::<_, StoreError>(summary)
            })
            .await
    }

    /// Delete `name` and every task in it. Returns what was removed.
    pub async fn delete_tag(&self, name: &str) -> Result<TagSummary, StoreError> {
        protect(name)?;
        self.resilience
            .execute(STORE_BREAKER, || async move {
                let _lease = self.lease(&[name], "delete-tag").await?;
                let _gate = self.gate().await;
                let mut doc = self.read_snapshot().await?;
                let partition = doc.remove_tag(name).ok_or_else(|| StoreError::TagNotFound {
                    tag: name.to_string(),
                })?;
                self.store.write(&doc).await?;
                let summary = TagSummary::of(name, &partition);
                info!(tag = name, tasks = summary.task_count, "deleted tag");
                Ok::<_, StoreError>(summary)
            })
            .await
    }
}
