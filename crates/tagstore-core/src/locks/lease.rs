//! RAII guard over one or more tag locks.

use std::sync::Arc;
use std::time::Duration;

use super::manager::TagLockManager;
use crate::domain::{LockId, StoreError};

/// Holds tag locks until dropped.
pub struct TagLease {
    manager: Arc<TagLockManager>,
    held: Vec<(String, LockId)>,
}

impl TagLease {
    /// Lock every tag in `tags` (lexicographic order, duplicates collapsed).
    pub async fn acquire(
        manager: &Arc<TagLockManager>,
        tags: &[&str],
        operation: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let held = manager.acquire_many(tags, operation, timeout).await?;
        Ok(Self {
            manager: Arc::clone(manager),
            held,
        })
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(|(tag, _)| tag.as_str())
    }

    pub fn lock_id(&self, tag: &str) -> Option<LockId> {
        self.held.iter().find(|(t, _)| t == tag).map(|(_, id)| *id)
    }
}

impl Drop for TagLease {
    fn drop(&mut self) {
        for (tag, lock_id) in self.held.drain(..).rev() {
            self.manager.release_lock(&tag, lock_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::SystemClock;

    #[tokio::test]
    async fn dropping_the_lease_unlocks_every_tag() {
        let manager = Arc::new(TagLockManager::new(
            Duration::from_millis(5),
            Arc::new(SystemClock),
        ));
        {
            let lease = TagLease::acquire(&manager, &["b", "a"], "copy", Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(lease.tags().collect::<Vec<_>>(), vec!["a", "b"]);
            assert!(lease.lock_id("a").is_some());
            assert!(manager.is_locked("a") && manager.is_locked("b"));
        }
        assert!(manager.get_all_locks().is_empty());
    }
}
