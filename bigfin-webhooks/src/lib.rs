#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Webhook signature verification and event ingestion. The provider
//! calls back over HTTP; this crate owns the constant-time signature
//! check and the envelope parsing, then routes recognized `transfer.*`
//! events to the [`bigfin_payments::TransferOrchestrator`]. The path is
//! linear — verify, parse, route, return — the orchestrator never calls
//! back into this layer.

use std::sync::Arc;

use bigfin_payments::StatusUpdate;
use bigfin_payments::TransferOrchestrator;

mod event;
mod signature;

pub use event::TransferEventKind;
pub use event::WebhookEvent;
pub use event::extract_transfer_fields;
pub use event::parse_event;
pub use signature::sign;
pub use signature::verify;

pub type WebhooksResult<T> = Result<T, WebhooksError>;

#[derive(Debug, thiserror::Error)]
pub enum WebhooksError {
    #[error("webhook signature verification failed")]
    SignatureInvalid,
    #[error("malformed webhook payload: {0}")]
    Malformed(String),
    #[error("orchestrator error: {0}")]
    Orchestrator(String),
}

impl From<bigfin_payments::PaymentsError> for WebhooksError {
    fn from(value: bigfin_payments::PaymentsError) -> Self {
        WebhooksError::Orchestrator(value.to_string())
    }
}

/// Entry point a provider-facing HTTP handler calls with the raw request:
/// the `X-Timestamp` header, the exact raw body bytes, and the
/// `X-Signature` header. Verifies the signature before any parsing runs,
/// per the spec's "webhook signature failure rejects with no handler
/// dispatch" rule.
pub struct WebhookHandler {
    shared_secret: Vec<u8>,
    orchestrator: Arc<TransferOrchestrator>,
}

impl WebhookHandler {
    #[must_use]
    pub fn new(shared_secret: impl Into<Vec<u8>>, orchestrator: Arc<TransferOrchestrator>) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            orchestrator,
        }
    }

    pub async fn handle(
        &self,
        timestamp: &str,
        raw_body: &[u8],
        signature_hex: &str,
    ) -> WebhooksResult<()> {
        if !signature::verify(&self.shared_secret, timestamp, raw_body, signature_hex) {
            return Err(WebhooksError::SignatureInvalid);
        }

        let event = event::parse_event(raw_body)?;
        self.dispatch(event).await
    }

    async fn dispatch(&self, event: WebhookEvent) -> WebhooksResult<()> {
        let Some(kind) = TransferEventKind::from_event_type(&event.event_type) else {
            tracing::info!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                "unrecognized or inert webhook event type; acknowledging"
            );
            return Ok(());
        };

        let (tenant_id, provider_ref) = extract_transfer_fields(&event.data)?;
        self.orchestrator
            .process_status_update(StatusUpdate {
                tenant_id,
                provider_ref,
                provider_status: kind.provider_status(),
                occurred_at: event.created_on,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bigfin_audit::NoopAuditHook;
    use bigfin_ledger::InMemoryLedgerEngine;
    use bigfin_payments::InMemoryContractStore;
    use bigfin_payments::InMemoryDisbursementStore;
    use bigfin_payments::InMemoryInstrumentStore;
    use bigfin_payments::InMemoryPaymentProvider;
    use bigfin_payments::InMemoryPrefundStore;
    use bigfin_payments::InMemoryRepaymentStore;
    use bigfin_tenancy::InMemoryIdempotencyStore;

    use super::*;

    fn test_orchestrator() -> Arc<TransferOrchestrator> {
        Arc::new(TransferOrchestrator::new(
            Arc::new(InMemoryPaymentProvider::new()),
            Arc::new(InMemoryInstrumentStore::new()),
            Arc::new(InMemoryDisbursementStore::new()),
            Arc::new(InMemoryRepaymentStore::new()),
            Arc::new(InMemoryContractStore::new()),
            Arc::new(InMemoryPrefundStore::new()),
            Arc::new(InMemoryLedgerEngine::new()),
            Arc::new(InMemoryIdempotencyStore::new()),
            Arc::new(NoopAuditHook),
        ))
    }

    #[tokio::test]
    async fn handle_rejects_an_invalid_signature() {
        let handler = WebhookHandler::new(b"secret".to_vec(), test_orchestrator());
        let body = br#"{"event_id":"evt_1","type":"transfer.completed","data":{}}"#;
        let result = handler.handle("1700000000", body, "deadbeef").await;
        assert!(matches!(result, Err(WebhooksError::SignatureInvalid)));
    }

    #[tokio::test]
    async fn handle_acknowledges_an_inert_event_type() {
        let handler = WebhookHandler::new(b"secret".to_vec(), test_orchestrator());
        let body = br#"{"event_id":"evt_1","type":"bank-account.created","data":{}}"#;
        let signature = sign(b"secret", "1700000000", body);
        let result = handler.handle("1700000000", body, &signature).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn handle_surfaces_malformed_payloads_after_signature_passes() {
        let handler = WebhookHandler::new(b"secret".to_vec(), test_orchestrator());
        let body = br#"{"type":"transfer.completed","data":{}}"#;
        let signature = sign(b"secret", "1700000000", body);
        let result = handler.handle("1700000000", body, &signature).await;
        assert!(matches!(result, Err(WebhooksError::Malformed(_))));
    }

    #[tokio::test]
    async fn handle_acknowledges_a_status_update_for_an_unknown_transfer() {
        let handler = WebhookHandler::new(b"secret".to_vec(), test_orchestrator());
        let body = br#"{"event_id":"evt_1","type":"transfer.completed","data":{"tenant_id":"t1","id":"tr_unknown"}}"#;
        let signature = sign(b"secret", "1700000000", body);
        let result = handler.handle("1700000000", body, &signature).await;
        assert!(result.is_ok());
    }
}
