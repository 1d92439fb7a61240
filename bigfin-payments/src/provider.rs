use std::collections::HashMap;
use std::collections::VecDeque;

use async_trait::async_trait;
use bigfin_tenancy::TenantId;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::PaymentsError;
use crate::PaymentsResult;

/// Raw provider-side status vocabulary, lowercase per §6's webhook event
/// shape and §4.3's status mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Returned,
    Canceled,
}

#[derive(Debug, Clone)]
pub struct CreateTransferRequest {
    pub source_payment_method_id: Option<String>,
    pub destination_payment_method_id: String,
    pub amount_cents: u64,
    pub description: String,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderTransfer {
    pub provider_id: String,
    pub status: ProviderStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct ProviderTransferRecord {
    pub id: String,
    pub status: ProviderStatus,
    pub amount_cents: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ProviderPaymentMethod {
    pub id: String,
    pub kind: String,
}

/// The external collaborator boundary: any concrete provider SDK must
/// satisfy this. `create_transfer` is expected to be idempotent on the
/// provider side for a repeated `idempotency_key`.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> PaymentsResult<ProviderTransfer>;

    async fn list_payment_methods(
        &self,
        account_ref: &str,
    ) -> PaymentsResult<Vec<ProviderPaymentMethod>>;

    async fn list_transfers(&self, window: TimeWindow) -> PaymentsResult<Vec<ProviderTransferRecord>>;

    async fn cancel(&self, provider_id: &str) -> PaymentsResult<()>;
}

/// In-memory double used by tests in place of the real provider SDK.
/// Deterministic ids, a listable transfer history, and a programmable
/// per-rail failure queue so orchestrator fallback iteration (S3) can be
/// exercised without a network boundary.
pub struct InMemoryPaymentProvider {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    payment_methods: HashMap<String, Vec<ProviderPaymentMethod>>,
    transfers: Vec<ProviderTransferRecord>,
    idempotency: HashMap<String, ProviderTransfer>,
    scripted_failures: VecDeque<String>,
}

impl Default for InMemoryPaymentProvider {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl InMemoryPaymentProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_payment_methods(
        &self,
        account_ref: impl Into<String>,
        methods: Vec<ProviderPaymentMethod>,
    ) {
        self.state
            .lock()
            .await
            .payment_methods
            .insert(account_ref.into(), methods);
    }

    /// Queues one synthetic failure. The next `create_transfer` call
    /// consumes it and returns an error instead of succeeding, letting
    /// tests simulate a rail failing so fallback iteration runs.
    pub async fn fail_next_transfer(&self, reason: impl Into<String>) {
        self.state.lock().await.scripted_failures.push_back(reason.into());
    }

    pub async fn set_status(&self, provider_id: &str, status: ProviderStatus) {
        let mut guard = self.state.lock().await;
        if let Some(record) = guard.transfers.iter_mut().find(|t| t.id == provider_id) {
            record.status = status;
            if matches!(status, ProviderStatus::Completed) {
                record.completed_at = Some(Utc::now());
            }
        }
    }
}

#[async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> PaymentsResult<ProviderTransfer> {
        let mut guard = self.state.lock().await;

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = guard.idempotency.get(key) {
                return Ok(existing.clone());
            }
        }

        if let Some(reason) = guard.scripted_failures.pop_front() {
            return Err(PaymentsError::PaymentFailed(reason));
        }

        let provider_id = Uuid::new_v4().to_string();
        let transfer = ProviderTransfer {
            provider_id: provider_id.clone(),
            status: ProviderStatus::Processing,
        };

        guard.transfers.push(ProviderTransferRecord {
            id: provider_id,
            status: ProviderStatus::Processing,
            amount_cents: request.amount_cents,
            created_at: Utc::now(),
            completed_at: None,
            metadata: request.metadata,
        });

        if let Some(key) = request.idempotency_key {
            guard.idempotency.insert(key, transfer.clone());
        }

        Ok(transfer)
    }

    async fn list_payment_methods(
        &self,
        account_ref: &str,
    ) -> PaymentsResult<Vec<ProviderPaymentMethod>> {
        Ok(self
            .state
            .lock()
            .await
            .payment_methods
            .get(account_ref)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_transfers(&self, window: TimeWindow) -> PaymentsResult<Vec<ProviderTransferRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .transfers
            .iter()
            .filter(|t| window.contains(t.created_at))
            .cloned()
            .collect())
    }

    async fn cancel(&self, provider_id: &str) -> PaymentsResult<()> {
        let mut guard = self.state.lock().await;
        if let Some(record) = guard.transfers.iter_mut().find(|t| t.id == provider_id) {
            record.status = ProviderStatus::Canceled;
        }
        Ok(())
    }
}

pub(crate) fn tenant_scoped_metadata(tenant_id: &TenantId, transfer_type: &str) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("tenant_id".to_string(), tenant_id.clone());
    metadata.insert("type".to_string(), transfer_type.to_string());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn create_transfer_is_idempotent_on_repeated_key() {
        let provider = InMemoryPaymentProvider::new();
        let request = CreateTransferRequest {
            source_payment_method_id: None,
            destination_payment_method_id: "pm-1".into(),
            amount_cents: 1_000,
            description: "test".into(),
            metadata: HashMap::new(),
            idempotency_key: Some("key-1".into()),
        };

        let first = provider
            .create_transfer(request.clone())
            .await
            .expect("first call");
        let second = provider
            .create_transfer(request)
            .await
            .expect("replayed call");
        assert_eq!(first.provider_id, second.provider_id);

        let transfers = provider
            .list_transfers(TimeWindow {
                start: Utc::now() - chrono::Duration::hours(1),
                end: Utc::now() + chrono::Duration::hours(1),
            })
            .await
            .expect("list");
        assert_eq!(transfers.len(), 1);
    }

    #[tokio::test]
    async fn scripted_failure_is_consumed_once() {
        let provider = InMemoryPaymentProvider::new();
        provider.fail_next_transfer("simulated outage").await;

        let request = CreateTransferRequest {
            source_payment_method_id: None,
            destination_payment_method_id: "pm-1".into(),
            amount_cents: 1_000,
            description: "test".into(),
            metadata: HashMap::new(),
            idempotency_key: None,
        };

        let first = provider.create_transfer(request.clone()).await;
        assert!(first.is_err());

        let second = provider.create_transfer(request).await;
        assert!(second.is_ok());
    }
}
