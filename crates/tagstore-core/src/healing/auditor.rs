//! SelfHealingAuditor - タスクドキュメントの自己修復
//!
//! One audit pass over the persisted document:
//! 1. absent file -> minimal document with an empty `master`
//! 2. unparseable file -> backup, then minimal document (when enabled)
//! 3. legacy `{"tasks": [...]}` layout -> migrated into a tag
//! 4. malformed tag entries -> repaired field by field
//! 5. missing `master` -> synthesized
//!
//! Every repair write is preceded by a timestamped backup of the current
//! file. Failures end up in the report; an audit never panics.
//!
//! A pass holds the document gate shared with the request path, so a repair
//! never interleaves with a read-modify-write of the same file.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::repair::{minimal_document, repair_document};
use crate::domain::{StoreError, TaggedStore};
use crate::impls::json_file_store::{sibling_path, write_atomic};
use crate::ports::Clock;

/// Outcome of one audit pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    /// Number of repairs applied.
    pub recovered: usize,
    pub errors: Vec<String>,
    pub backups: Vec<PathBuf>,
    pub actions: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.recovered == 0 && self.errors.is_empty()
    }

    fn record(&mut self, action: impl Into<String>) {
        self.recovered += 1;
        self.actions.push(action.into());
    }
}

pub struct SelfHealingAuditor {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    recreate_on_corrupt: bool,
    gate: Arc<Mutex<()>>,
}

impl SelfHealingAuditor {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
            recreate_on_corrupt: true,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Share the document gate with other writers of the same file.
    pub fn with_gate(mut self, gate: Arc<Mutex<()>>) -> Self {
        self.gate = gate;
        self
    }

    /// Whether an unparseable document is replaced (after a backup) or only
    /// reported.
    pub fn with_recreate_on_corrupt(mut self, enabled: bool) -> Self {
        self.recreate_on_corrupt = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run one pass.
    pub async fn audit(&self) -> AuditReport {
        let _gate = self.gate.lock().await;
        self.audit_gated().await
    }

    /// Run one pass for a caller that already holds the document gate.
    pub(crate) async fn audit_gated(&self) -> AuditReport {
        let mut report = AuditReport::default();
        if let Err(e) = self.run(&mut report).await {
            error!(path = %self.path.display(), error = %e, "self-healing audit failed");
            report.errors.push(e.to_string());
        }
        if report.recovered > 0 {
            info!(
                path = %self.path.display(),
                recovered = report.recovered,
                backups = report.backups.len(),
                "self-healing repaired tasks document"
            );
        }
        report
    }

    async fn run(&self, report: &mut AuditReport) -> Result<(), StoreError> {
        let now = self.clock.now();
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                self.write(&minimal_document(now)).await?;
                report.record("created missing tasks document");
                return Ok(());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let doc = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(doc)) => doc,
            Ok(_) => return self.recreate(report, now, "top-level value is not an object").await,
            Err(e) => return self.recreate(report, now, &e.to_string()).await,
        };

        let (repaired, actions) = repair_document(doc, now);
        let repaired = Value::Object(repaired);
        if !actions.is_empty() {
            report.backups.push(self.backup(now).await?);
            self.write(&repaired).await?;
            for action in actions {
                warn!(path = %self.path.display(), %action, "repaired tasks document");
                report.record(action);
            }
        }

        if let Err(e) = serde_json::from_value::<TaggedStore>(repaired) {
            report
                .errors
                .push(format!("document still does not match the tagged layout: {e}"));
        }
        Ok(())
    }

    async fn recreate(&self, report: &mut AuditReport, now: DateTime<Utc>, reason: &str) -> Result<(), StoreError> {
        if !self.recreate_on_corrupt {
            return Err(StoreError::CorruptDocument {
                path: self.path.clone(),
                reason: reason.to_string(),
            });
        }
        let backup = self.backup(now).await?;
        warn!(
            path = %self.path.display(),
            backup = %backup.display(),
            reason,
            "tasks document is corrupt; recreating"
        );
        report.backups.push(backup);
        self.write(&minimal_document(now)).await?;
        report.record(format!("recreated corrupt tasks document ({reason})"));
        Ok(())
    }

    /// Copy the current file to `<name>.backup-<timestamp>[-n]`.
    async fn backup(&self, now: DateTime<Utc>) -> Result<PathBuf, StoreError> {
        let stamp = now.format("%Y%m%dT%H%M%S%3fZ").to_string();
        let mut candidate = sibling_path(&self.path, &format!(".backup-{stamp}"));
        let mut n = 1;
        while tokio::fs::try_exists(&candidate)
            .await
            .map_err(|e| StoreError::io(&candidate, e))?
        {
            candidate = sibling_path(&self.path, &format!(".backup-{stamp}-{n}"));
            n += 1;
        }
        tokio::fs::copy(&self.path, &candidate)
            .await
            .map_err(|e| StoreError::io(&candidate, e))?;
        Ok(candidate)
    }

    async fn write(&self, doc: &Value) -> Result<(), StoreError> {
        let mut bytes = serde_json::to_vec_pretty(doc)?;
        bytes.push(b'\n');
        write_atomic(&self.path, &bytes).await
    }
}
