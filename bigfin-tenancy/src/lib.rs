#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Tenant scoping and idempotency-key bookkeeping shared by every other
//! domain crate in the workspace. Every mutable entity in this system
//! carries a `tenant_id`; this crate owns the one normalization rule that
//! applies to all of them (reject blank/whitespace tenant ids) plus the
//! idempotency store used to make a mutating call safe to retry.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use thiserror::Error;

mod in_memory;

pub use crate::in_memory::InMemoryIdempotencyStore;

pub type TenantId = String;

/// How long a captured idempotent response stays replayable.
pub const IDEMPOTENCY_RECORD_TTL: Duration = Duration::hours(24);

pub type TenancyResult<T> = Result<T, TenancyError>;

#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("idempotency key already in use with a different payload: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Rejects a blank or whitespace-only tenant id. Every request that
/// carries a `tenant_id` should be normalized through this before it
/// reaches a domain engine.
pub fn normalize_tenant_id(tenant_id: &str) -> TenancyResult<TenantId> {
    let trimmed = tenant_id.trim();
    if trimmed.is_empty() {
        return Err(TenancyError::Validation(
            "tenant_id cannot be empty".into(),
        ));
    }
    Ok(trimmed.to_string())
}

/// A record produced by a prior idempotent call. `response` is the exact
/// JSON-serializable payload the caller received; replaying the same key
/// returns it unchanged without re-executing the underlying operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub key: String,
    pub tenant_id: TenantId,
    pub response: String,
    pub status_code: u16,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    #[must_use]
    pub fn new(tenant_id: TenantId, key: String, response: String, status_code: u16) -> Self {
        let created_at = Utc::now();
        Self {
            key,
            tenant_id,
            response,
            status_code,
            created_at,
            expires_at: created_at + IDEMPOTENCY_RECORD_TTL,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Store of idempotency records, keyed by `(tenant_id, key)`. Insertion
/// uses primary-key contention to detect replays: a second `begin` call
/// with the same key while the first is still in flight must be rejected
/// by the store's backing implementation (a unique-index insert in a
/// durable store; a simple presence check here).
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Looks up a still-valid record for `(tenant_id, key)`, pruning it
    /// first if it has expired.
    async fn get(&self, tenant_id: &TenantId, key: &str) -> TenancyResult<Option<IdempotencyRecord>>;

    /// Persists the captured response for a key. Errors if a live
    /// (non-expired) record already exists for the same key.
    async fn put(&self, record: IdempotencyRecord) -> TenancyResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_tenant_id() {
        assert_eq!(normalize_tenant_id("  tenant-1  ").unwrap(), "tenant-1");
        assert!(matches!(
            normalize_tenant_id("   "),
            Err(TenancyError::Validation(_))
        ));
    }

    #[test]
    fn record_expires_after_ttl() {
        let record = IdempotencyRecord::new(
            "tenant-1".into(),
            "key-1".into(),
            "{}".into(),
            200,
        );
        assert!(!record.is_expired(record.created_at));
        assert!(record.is_expired(record.created_at + Duration::hours(25)));
        assert!(!record.is_expired(record.created_at + Duration::hours(23)));
    }
}
