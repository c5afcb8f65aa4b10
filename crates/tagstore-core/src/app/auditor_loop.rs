//! AuditorLoop - 定期的な自己修復
//!
//! Runs [`SelfHealingAuditor::audit`] on a fixed interval in its own task.
//! The first pass runs immediately. Request paths never wait on it; its
//! repairs are simply visible to the next store read.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::healing::SelfHealingAuditor;

/// Auditor loop handle.
/// - `request_shutdown()` で次の tick 待ちを打ち切る
/// - `shutdown_and_join()` で終了まで待てる
pub struct AuditorLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl AuditorLoop {
    pub fn spawn(auditor: Arc<SelfHealingAuditor>, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            run(auditor, every, &mut shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    /// Stop after the pass in flight, if any.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already have exited
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn run(auditor: Arc<SelfHealingAuditor>, every: Duration, shutdown_rx: &mut watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // handle dropped without an explicit shutdown
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let report = auditor.audit().await;
        if report.is_clean() {
            debug!(path = %auditor.path().display(), "self-healing audit clean");
        } else {
            info!(
                path = %auditor.path().display(),
                recovered = report.recovered,
                errors = report.errors.len(),
                "self-healing audit finished"
            );
        }
    }
    debug!(path = %auditor.path().display(), "auditor loop stopped");
}
