//! InMemoryTaskStore - テスト用・組み込み用の正本

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::domain::{StoreError, TaggedStore};
use crate::ports::TaskStore;

/// Keeps the document in memory and counts writes.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    doc: Mutex<TaggedStore>,
    writes: AtomicUsize,
}

impl InMemoryTaskStore {
    pub fn new(doc: TaggedStore) -> Self {
        Self {
            doc: Mutex::new(doc),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of successful `write` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> TaggedStore {
        self.doc.lock().await.clone()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn read(&self) -> Result<TaggedStore, StoreError> {
        Ok(self.doc.lock().await.clone())
    }

    async fn write(&self, store: &TaggedStore) -> Result<(), StoreError> {
        *self.doc.lock().await = store.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
