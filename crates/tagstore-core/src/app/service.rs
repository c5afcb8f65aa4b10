//! TaskService - リクエスト経路のエントリポイント
//!
//! Every mutating call follows the same path:
//! resolve tag -> lease tag(s) -> document gate -> read snapshot -> apply ->
//! write once -> release -> regenerate derived files once per affected tag.
//!
//! Everything up to the release runs inside the resilience wrapper under the
//! [`STORE_BREAKER`] circuit, so a retried attempt starts again from a fresh
//! lease and a fresh read.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::domain::{StoreError, TaggedStore, MASTER_TAG};
use crate::healing::SelfHealingAuditor;
use crate::impls::is_missing_file;
use crate::locks::{TagLease, TagLockManager};
use crate::moves::{BatchMoveOutcome, CrossTagMoveOptions, CrossTagMoveOutcome, MoveEngine, MoveOutcome};
use crate::ports::{Clock, FileRegenerator, TaskStore};
use crate::resilience::ResilienceWrapper;

/// Breaker guarding reads and writes of the tasks document.
pub const STORE_BREAKER: &str = "task-store";

/// Tag used when the caller does not name one.
pub fn resolve_tag(tag: Option<&str>) -> &str {
    tag.filter(|t| !t.is_empty()).unwrap_or(MASTER_TAG)
}

/// Request-path entry points.
///
/// Tag leases order operations on the same tag. The document is one file
/// though, so every read-modify-write also holds the document gate, shared
/// with the self-healing auditor: two mutations on different tags hold their
/// leases at the same time but read, modify and write the file one after the
/// other, so neither loses the other's change. The gate lives in this process
/// only; separate processes writing the same file are not coordinated and the
/// last rename wins.
pub struct TaskService {
    pub(super) store: Arc<dyn TaskStore>,
    pub(super) locks: Arc<TagLockManager>,
    pub(super) resilience: Arc<ResilienceWrapper>,
    pub(super) engine: MoveEngine,
    pub(super) regenerator: Option<Arc<dyn FileRegenerator>>,
    pub(super) auditor: Option<Arc<SelfHealingAuditor>>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) lock_timeout: Duration,
    pub(super) gate: Arc<Mutex<()>>,
}

impl TaskService {
    /// Move one task or subtask inside `tag` (default `master`).
    pub async fn move_within_tag(
        &self,
        tag: Option<&str>,
        source_id: &str,
        destination_id: &str,
        generate_files: bool,
    ) -> Result<MoveOutcome, StoreError> {
        let tag = resolve_tag(tag);
        let outcome = self
            .resilience
            .execute(STORE_BREAKER, || async move {
                let _lease = self.lease(&[tag], "move").await?;
                let _gate = self.gate().await;
                let mut doc = self.read_snapshot().await?;
                let outcome = self.engine.move_within_tag(&mut doc, tag, source_id, destination_id)?;
                self.store.write(&doc).await?;
                Ok::<_, StoreError>(outcome)
            })
            .await?;

        if generate_files {
            self.regenerate(&[tag]).await;
        }
        Ok(outcome)
    }

    /// Move several items inside `tag` with a single write and at most one
    /// regeneration.
    pub async fn move_batch<S: AsRef<str>>(
        &self,
        tag: Option<&str>,
        source_ids: &[S],
        destination_ids: &[S],
        generate_files: bool,
    ) -> Result<BatchMoveOutcome, StoreError> {
        let tag = resolve_tag(tag);
        let outcome = self
            .resilience
            .execute(STORE_BREAKER, || async move {
                let _lease = self.lease(&[tag], "move-batch").await?;
                let _gate = self.gate().await;
                let mut doc = self.read_snapshot().await?;
                let outcome = self
                    .engine
                    .move_batch_within_tag(&mut doc, tag, source_ids, destination_ids)?;
                self.store.write(&doc).await?;
                Ok::<_, StoreError>(outcome)
            })
            .await?;

        if generate_files {
            self.regenerate(&[tag]).await;
        }
        Ok(outcome)
    }

    /// Move whole tasks between tags. Both tags are leased for the duration.
    pub async fn move_between_tags<S: AsRef<str>>(
        &self,
        source_ids: &[S],
        source_tag: &str,
        target_tag: &str,
        options: &CrossTagMoveOptions,
        generate_files: bool,
    ) -> Result<CrossTagMoveOutcome, StoreError> {
        let outcome = self
            .resilience
            .execute(STORE_BREAKER, || async move {
                let _lease = self.lease(&[source_tag, target_tag], "move-tag").await?;
                let _gate = self.gate().await;
                let mut doc = self.read_snapshot().await?;
                let outcome = self.engine.move_tasks_between_tags(
                    &mut doc, source_ids, source_tag, target_tag, options,
                )?;
                self.store.write(&doc).await?;
                Ok::<_, StoreError>(outcome)
            })
            .await?;

        if generate_files {
            self.regenerate(&[source_tag, target_tag]).await;
        }
        Ok(outcome)
    }

    /// Read-only snapshot of the document. Takes no tag lease.
    pub async fn snapshot(&self) -> Result<TaggedStore, StoreError> {
        self.resilience
            .execute(STORE_BREAKER, || async move {
                let _gate = self.gate().await;
                self.read_snapshot().await
            })
            .await
    }

    /// Hold across one read-modify-write of the document.
    pub(super) async fn gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    pub(super) async fn lease(&self, tags: &[&str], operation: &str) -> Result<TagLease, StoreError> {
        TagLease::acquire(&self.locks, tags, operation, self.lock_timeout).await
    }

    /// Read the document. A missing or corrupt document gets one audit pass
    /// and a second read when an auditor is installed. Call with the gate
    /// held.
    pub(super) async fn read_snapshot(&self) -> Result<TaggedStore, StoreError> {
        let err = match self.store.read().await {
            Ok(doc) => return Ok(doc),
            Err(err) => err,
        };
        let recoverable = matches!(err, StoreError::CorruptDocument { .. }) || is_missing_file(&err);
        let Some(auditor) = self.auditor.as_ref().filter(|_| recoverable) else {
            return Err(err);
        };

        warn!(error = %err, "tasks document unreadable; running self-healing audit");
        let report = auditor.audit_gated().await;
        if !report.errors.is_empty() {
            return Err(err);
        }
        self.store.read().await
    }

    /// Regenerate derived files once per distinct tag. Failures are logged;
    /// the move itself is already persisted.
    async fn regenerate(&self, tags: &[&str]) {
        let Some(regenerator) = &self.regenerator else {
            return;
        };
        let mut done: Vec<&str> = Vec::with_capacity(tags.len());
        for &tag in tags {
            if done.contains(&tag) {
                continue;
            }
            done.push(tag);
            match regenerator.regenerate(tag).await {
                Ok(()) => info!(tag, "regenerated task files"),
                Err(e) => warn!(tag, error = %e, "task file regeneration failed"),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::domain::StoreError;
    use crate::ports::FileRegenerator;

    /// Records every regeneration request.
    #[derive(Debug, Default)]
    pub struct RecordingRegenerator {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingRegenerator {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FileRegenerator for RecordingRegenerator {
        async fn regenerate(&self, tag: &str) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push(tag.to_string());
            Ok(())
        }
    }
}
