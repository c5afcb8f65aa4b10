//! Status - ステータスクエリ
//!
//! Serialisable snapshots of the in-process coordination state: held tag
//! locks and circuit breakers.

use serde::Serialize;

use super::builder::App;
use crate::locks::LockInfo;
use crate::resilience::BreakerStatus;

/// Status はロックとブレーカーの現在値
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub locks: Vec<LockInfo>,
    pub breakers: Vec<BreakerStatus>,
}

impl App {
    /// Every currently held tag lock, ordered by tag.
    pub fn lock_status(&self) -> Vec<LockInfo> {
        self.locks().get_all_locks()
    }

    /// Every breaker created so far, ordered by name.
    pub fn breaker_status(&self) -> Vec<BreakerStatus> {
        self.resilience().breaker_statuses()
    }

    pub fn status(&self) -> Status {
        Status {
            locks: self.lock_status(),
            breakers: self.breaker_status(),
        }
    }
}
