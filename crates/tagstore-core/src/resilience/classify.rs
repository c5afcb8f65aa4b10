//! Which failures are worth repeating, and which ones count against a breaker.

use crate::domain::{ErrorKind, StoreError};

const NON_RETRYABLE_PATTERNS: &[&str] = &["validation", "unauthorized", "forbidden"];

/// Whether repeating the same call could succeed.
///
/// Never retried: client errors, permission problems, corrupt documents,
/// 4xx upstream answers other than 408/429, and errors whose message names a
/// validation or auth failure. Everything else is.
pub fn is_retryable(err: &StoreError) -> bool {
    if let StoreError::MaxRetriesExceeded { .. } = err {
        return false;
    }
    if let StoreError::Upstream {
        status: Some(status),
        ..
    } = err
        && (400..500).contains(status)
        && !matches!(status, 408 | 429)
    {
        return false;
    }
    match err.kind() {
        ErrorKind::Validation
        | ErrorKind::NotFound
        | ErrorKind::Conflict
        | ErrorKind::Permission
        | ErrorKind::Corruption => false,
        ErrorKind::Contention | ErrorKind::Unavailable | ErrorKind::Transient => {
            let message = err.to_string().to_lowercase();
            !NON_RETRYABLE_PATTERNS.iter().any(|p| message.contains(p))
        }
    }
}

/// Whether a failure says something about the health of the dependency
/// behind a breaker. An open circuit reporting itself does not.
pub fn counts_as_failure(err: &StoreError) -> bool {
    if let StoreError::CircuitOpen { .. } = err {
        return false;
    }
    matches!(err.kind(), ErrorKind::Transient | ErrorKind::Unavailable)
}
