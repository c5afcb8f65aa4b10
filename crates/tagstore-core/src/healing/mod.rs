//! Self-healing of the persisted tasks document.

pub mod auditor;
pub mod repair;

pub use auditor::{AuditReport, SelfHealingAuditor};
pub use repair::{minimal_document, repair_document, LEGACY_TAG};
