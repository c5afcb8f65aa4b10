//! TagLockManager - タグ単位のアドバイザリロック
//!
//! State per tag: `UNLOCKED -> LOCKED(lock_id, operation, timestamp) -> UNLOCKED`.
//!
//! - In-process only; nothing here spans multiple processes.
//! - A lock older than the caller's timeout is considered abandoned and is
//!   reclaimed by the next caller.
//! - Only the holder's `LockId` can release a lock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::{LockId, StoreError};
use crate::ports::{Clock, SystemClock};

/// Default poll interval while waiting for a busy tag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct TagLock {
    lock_id: LockId,
    operation: String,
    timestamp: DateTime<Utc>,
    acquired_at: Instant,
}

/// Introspection view of a held lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub tag: String,
    pub lock_id: String,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
    pub age_ms: u64,
}

pub struct TagLockManager {
    locks: Mutex<HashMap<String, TagLock>>,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl TagLockManager {
    pub fn new(poll_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            poll_interval,
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, HashMap<String, TagLock>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock `tag` for `operation`, waiting at most `timeout`.
    ///
    /// A lock held for longer than `timeout` is taken over, as long as the
    /// caller's own wait has not run out.
    pub async fn acquire_lock(
        &self,
        tag: &str,
        operation: &str,
        timeout: Duration,
    ) -> Result<LockId, StoreError> {
        let started = Instant::now();
        loop {
            let waited = started.elapsed();
            let out_of_time = waited >= timeout;
            match self.try_take(tag, operation, timeout, !out_of_time) {
                Ok(lock_id) => return Ok(lock_id),
                Err(holder) if out_of_time => {
                    return Err(StoreError::LockTimeout {
                        tag: tag.to_string(),
                        waited_ms: waited.as_millis() as u64,
                        holder: Some(holder),
                    });
                }
                Err(_) => {}
            }
            tokio::time::sleep(self.poll_interval.min(timeout - waited)).await;
        }
    }

    /// Take the lock if it is free (or stale, when `reclaim` is set).
    /// Otherwise describe the current holder.
    fn try_take(
        &self,
        tag: &str,
        operation: &str,
        stale_after: Duration,
        reclaim: bool,
    ) -> Result<LockId, String> {
        let mut locks = self.state();
        if let Some(existing) = locks.get(tag) {
            let age = existing.acquired_at.elapsed();
            if !reclaim || age <= stale_after {
                return Err(format!("{} ({})", existing.lock_id, existing.operation));
            }
            warn!(
                tag,
                stale_lock = %existing.lock_id,
                stale_operation = %existing.operation,
                age_ms = age.as_millis() as u64,
                "reclaiming expired tag lock"
            );
        }
        let lock_id = LockId::new();
        locks.insert(
            tag.to_string(),
            TagLock {
                lock_id,
                operation: operation.to_string(),
                timestamp: self.clock.now(),
                acquired_at: Instant::now(),
            },
        );
        debug!(tag, operation, %lock_id, "tag lock acquired");
        Ok(lock_id)
    }

    /// Release `tag` if `lock_id` is the current holder. Returns whether
    /// anything was released.
    pub fn release_lock(&self, tag: &str, lock_id: LockId) -> bool {
        let mut locks = self.state();
        match locks.get(tag) {
            Some(current) if current.lock_id == lock_id => {
                locks.remove(tag);
                debug!(tag, %lock_id, "tag lock released");
                true
            }
            Some(current) => {
                debug!(tag, %lock_id, holder = %current.lock_id, "ignoring release from non-holder");
                false
            }
            None => false,
        }
    }

    /// Lock several tags in lexicographic order. On failure every lock taken
    /// so far is released again.
    pub async fn acquire_many(
        &self,
        tags: &[&str],
        operation: &str,
        timeout: Duration,
    ) -> Result<Vec<(String, LockId)>, StoreError> {
        let mut ordered: Vec<&str> = tags.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut held = Vec::with_capacity(ordered.len());
        for tag in ordered {
            match self.acquire_lock(tag, operation, timeout).await {
                Ok(lock_id) => held.push((tag.to_string(), lock_id)),
                Err(e) => {
                    for (tag, lock_id) in held.iter().rev() {
                        self.release_lock(tag, *lock_id);
                    }
                    return Err(e);
                }
            }
        }
        Ok(held)
    }

    pub fn is_locked(&self, tag: &str) -> bool {
        self.state().contains_key(tag)
    }

    pub fn get_lock_info(&self, tag: &str) -> Option<LockInfo> {
        self.state().get(tag).map(|lock| info_of(tag, lock))
    }

    /// Every held lock, ordered by tag.
    pub fn get_all_locks(&self) -> Vec<LockInfo> {
        let mut all: Vec<LockInfo> = self
            .state()
            .iter()
            .map(|(tag, lock)| info_of(tag, lock))
            .collect();
        all.sort_by(|a, b| a.tag.cmp(&b.tag));
        all
    }
}

impl Default for TagLockManager {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, Arc::new(SystemClock))
    }
}

fn info_of(tag: &str, lock: &TagLock) -> LockInfo {
    LockInfo {
        tag: tag.to_string(),
        lock_id: lock.lock_id.to_string(),
        operation: lock.operation.clone(),
        timestamp: lock.timestamp,
        age_ms: lock.acquired_at.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> Arc<TagLockManager> {
        Arc::new(TagLockManager::new(
            Duration::from_millis(10),
            Arc::new(SystemClock),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn free_tag_locks_immediately() {
        let locks = manager();
        let id = locks
            .acquire_lock("t1", "move", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(locks.is_locked("t1"));
        let info = locks.get_lock_info("t1").unwrap();
        assert_eq!(info.operation, "move");
        assert_eq!(info.lock_id, id.to_string());
        assert!(locks.release_lock("t1", id));
        assert!(!locks.is_locked("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn busy_tag_times_out() {
        let locks = manager();
        let _held = locks
            .acquire_lock("t1", "first", Duration::from_secs(1))
            .await
            .unwrap();
        let err = locks
            .acquire_lock("t1", "second", Duration::from_millis(50))
            .await
            .unwrap_err();
        match err {
            StoreError::LockTimeout { tag, waited_ms, holder } => {
                assert_eq!(tag, "t1");
                assert!(waited_ms >= 50);
                assert!(holder.unwrap().contains("first"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_gets_the_lock_after_release() {
        let locks = manager();
        let first = locks
            .acquire_lock("t1", "first", Duration::from_secs(5))
            .await
            .unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire_lock("t1", "second", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());
        assert!(locks.release_lock("t1", first));

        let second = waiter.await.unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(locks.get_lock_info("t1").unwrap().operation, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_never_overlap() {
        let locks = manager();
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for n in 0..4 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            handles.push(tokio::spawn(async move {
                let id = locks
                    .acquire_lock("t1", &format!("op{n}"), Duration::from_secs(10))
                    .await
                    .unwrap();
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(25)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                assert!(locks.release_lock("t1", id));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(!locks.is_locked("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lock_is_reclaimed() {
        let locks = manager();
        let stale = locks
            .acquire_lock("t1", "crashed", Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;

        let fresh = locks
            .acquire_lock("t1", "recovery", Duration::from_millis(50))
            .await
            .unwrap();
        assert_ne!(stale, fresh);
        assert!(!locks.release_lock("t1", stale));
        assert!(locks.release_lock("t1", fresh));
    }

    #[tokio::test]
    async fn only_the_holder_can_release() {
        let locks = manager();
        let id = locks
            .acquire_lock("t1", "move", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!locks.release_lock("t1", LockId::new()));
        assert!(!locks.release_lock("other", id));
        assert!(locks.is_locked("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn many_tags_lock_in_order_and_unwind_on_failure() {
        let locks = manager();
        let held = locks
            .acquire_many(&["zeta", "alpha", "zeta"], "cross", Duration::from_secs(1))
            .await
            .unwrap();
        let tags: Vec<_> = held.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tags, vec!["alpha", "zeta"]);
        assert_eq!(
            locks.get_all_locks().iter().map(|l| l.tag.clone()).collect::<Vec<_>>(),
            vec!["alpha".to_string(), "zeta".to_string()]
        );

        for (tag, id) in held {
            locks.release_lock(&tag, id);
        }
        let blocker = locks
            .acquire_lock("zeta", "blocker", Duration::from_secs(10))
            .await
            .unwrap();
        let err = locks
            .acquire_many(&["alpha", "zeta"], "cross", Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
        assert!(!locks.is_locked("alpha"));
        assert!(locks.release_lock("zeta", blocker));
    }
}
