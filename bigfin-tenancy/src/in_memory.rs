use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::IdempotencyRecord;
use crate::IdempotencyStore;
use crate::TenancyError;
use crate::TenancyResult;
use crate::TenantId;

/// In-memory `IdempotencyStore`. A single mutex over a map, matching the
/// coarse-grained locking this workspace uses for every other in-memory
/// store; a durable store would back `put` with a unique-index insert
/// instead of a presence check.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<(TenantId, String), IdempotencyRecord>>,
}

impl InMemoryIdempotencyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(
        &self,
        tenant_id: &TenantId,
        key: &str,
    ) -> TenancyResult<Option<IdempotencyRecord>> {
        let mut guard = self.records.lock().await;
        let map_key = (tenant_id.clone(), key.to_string());
        let Some(record) = guard.get(&map_key) else {
            return Ok(None);
        };
        if record.is_expired(Utc::now()) {
            guard.remove(&map_key);
            return Ok(None);
        }
        Ok(Some(record.clone()))
    }

    async fn put(&self, record: IdempotencyRecord) -> TenancyResult<()> {
        let mut guard = self.records.lock().await;
        let map_key = (record.tenant_id.clone(), record.key.clone());
        if let Some(existing) = guard.get(&map_key) {
            if !existing.is_expired(Utc::now()) {
                return Err(TenancyError::Conflict(record.key));
            }
        }
        guard.insert(map_key, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn replay_returns_stored_response() {
        let store = InMemoryIdempotencyStore::new();
        let record = IdempotencyRecord::new(
            "tenant-1".into(),
            "key-1".into(),
            "{\"id\":\"abc\"}".into(),
            201,
        );
        store.put(record.clone()).await.expect("store record");

        let fetched = store
            .get(&"tenant-1".to_string(), "key-1")
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(fetched.response, record.response);
        assert_eq!(fetched.status_code, 201);
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let store = InMemoryIdempotencyStore::new();
        let result = store
            .get(&"tenant-1".to_string(), "missing")
            .await
            .expect("lookup");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn live_record_blocks_replacement() {
        let store = InMemoryIdempotencyStore::new();
        let record = IdempotencyRecord::new("tenant-1".into(), "key-1".into(), "{}".into(), 200);
        store.put(record.clone()).await.expect("first put");

        let conflict = store.put(record).await;
        assert!(matches!(conflict, Err(TenancyError::Conflict(_))));
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let store = InMemoryIdempotencyStore::new();
        store
            .put(IdempotencyRecord::new(
                "tenant-1".into(),
                "key-1".into(),
                "{}".into(),
                200,
            ))
            .await
            .expect("store for tenant 1");

        let other_tenant = store
            .get(&"tenant-2".to_string(), "key-1")
            .await
            .expect("lookup");
        assert!(other_tenant.is_none());
    }
}
