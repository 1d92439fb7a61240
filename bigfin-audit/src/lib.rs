#![deny(clippy::print_stdout, clippy::print_stderr)]

//! The audit surface the core calls into. Emitting and serving durable
//! audit records is an out-of-scope admin concern; this crate owns only
//! the port the ledger, payments, and reconciliation engines call on
//! every mutation, plus an in-memory double for tests. Cryptographic
//! anchoring/hash-chaining of this log is an explicit non-goal.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::RwLock;

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// One notification passed to the hook. `entity_type`/`entity_id`
/// identify what changed (e.g. `"journal"`/a journal id); `metadata` is
/// an opaque payload the caller fills in with whatever is useful for an
/// eventual audit-log entry (the persistence and serving of which is
/// delegated to the out-of-scope admin surface).
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub tenant_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            action: action.into(),
            actor: actor.into(),
            occurred_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Notified by the ledger, payments, and reconciliation engines after
/// every mutation that commits. A hook implementation must not be able
/// to roll back the mutation it is notified of: by the time `notify` is
/// called, the triggering transaction has already committed.
#[async_trait]
pub trait AuditHook: Send + Sync {
    async fn notify(&self, event: AuditEvent) -> AuditResult<()>;
}

/// Discards every event. Used where no audit surface is wired up (unit
/// tests of a single domain crate in isolation).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditHook;

#[async_trait]
impl AuditHook for NoopAuditHook {
    async fn notify(&self, _event: AuditEvent) -> AuditResult<()> {
        Ok(())
    }
}

/// Retains every event in order. Used by integration tests that assert
/// on what got audited without standing up the real admin-side log.
#[derive(Default)]
pub struct InMemoryAuditHook {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditHook {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    pub async fn events_for(&self, tenant_id: &str) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| event.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditHook for InMemoryAuditHook {
    async fn notify(&self, event: AuditEvent) -> AuditResult<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn noop_hook_discards_events() {
        let hook = NoopAuditHook;
        hook.notify(AuditEvent::new("t1", "journal", "j1", "created", "system"))
            .await
            .expect("notify");
    }

    #[tokio::test]
    async fn in_memory_hook_retains_events_in_order() {
        let hook = InMemoryAuditHook::shared();
        hook.notify(AuditEvent::new("t1", "journal", "j1", "created", "system"))
            .await
            .expect("notify first");
        hook.notify(AuditEvent::new("t1", "journal", "j1", "reversed", "ops-1"))
            .await
            .expect("notify second");

        let events = hook.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "created");
        assert_eq!(events[1].action, "reversed");
    }

    #[tokio::test]
    async fn events_are_filterable_by_tenant() {
        let hook = InMemoryAuditHook::shared();
        hook.notify(AuditEvent::new("t1", "journal", "j1", "created", "system"))
            .await
            .expect("notify t1");
        hook.notify(AuditEvent::new("t2", "journal", "j2", "created", "system"))
            .await
            .expect("notify t2");

        assert_eq!(hook.events_for("t1").await.len(), 1);
        assert_eq!(hook.events_for("t2").await.len(), 1);
    }
}
