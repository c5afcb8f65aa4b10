//! TaskStore port - タグ付きドキュメントの永続化
//!
//! The whole document is the unit of I/O: callers read a full snapshot, change
//! it in memory and write the full document back exactly once per logical
//! operation.
//!
//! # 実装
//! - `impls::JsonFileTaskStore`: JSON file, replaced atomically on write
//! - `impls::InMemoryTaskStore`: tests and embedding

use async_trait::async_trait;

use crate::domain::{StoreError, TaggedStore};

/// TaskStore は `{tag -> {tasks, metadata}}` ドキュメントの正本
///
/// # 設計原則
/// - read は常にドキュメント全体のスナップショットを返す
/// - write はドキュメント全体を一度に置き換える（部分書き込みなし）
/// - 排他制御は呼び出し側（TagLockManager）の責務
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Read the whole document.
    ///
    /// Fails with `StoreError::CorruptDocument` when the stored bytes do not
    /// parse, so the caller can hand the document to the auditor.
    async fn read(&self) -> Result<TaggedStore, StoreError>;

    /// Replace the whole document.
    async fn write(&self, store: &TaggedStore) -> Result<(), StoreError>;
}
