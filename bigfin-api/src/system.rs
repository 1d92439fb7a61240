use std::sync::Arc;

use bigfin_audit::AuditHook;
use bigfin_audit::NoopAuditHook;
use bigfin_ledger::InMemoryLedgerEngine;
use bigfin_ledger::LedgerEngine;
use bigfin_payments::InMemoryContractStore;
use bigfin_payments::InMemoryDisbursementStore;
use bigfin_payments::InMemoryInstrumentStore;
use bigfin_payments::InMemoryPaymentProvider;
use bigfin_payments::InMemoryPrefundStore;
use bigfin_payments::InMemoryRepaymentStore;
use bigfin_payments::TransferOrchestrator;
use bigfin_policy::InMemoryPolicyStore;
use bigfin_policy::PolicyStore;
use bigfin_reconcile::InMemoryReconciliationStore;
use bigfin_reconcile::ReconciliationEngine;
use bigfin_tenancy::InMemoryIdempotencyStore;
use bigfin_webhooks::WebhookHandler;

use crate::ledger_facade::LedgerFacade;
use crate::payments_facade::PaymentsFacade;
use crate::reconciliation_facade::ReconciliationFacade;
use crate::telemetry::Telemetry;
use crate::webhooks_facade::WebhooksFacade;

/// Composition root: builds every domain engine once and hands back the
/// thin facades that wrap them. This in-memory wiring is meant for demos
/// and integration tests — a real deployment swaps the `InMemory*`
/// stores for their durable counterparts without touching the facades.
#[derive(Clone)]
pub struct BigFinSystem {
    pub ledger: LedgerFacade,
    pub payments: PaymentsFacade,
    pub reconciliation: ReconciliationFacade,
    pub webhooks: WebhooksFacade,
    pub policy_store: Arc<dyn PolicyStore>,
    pub telemetry: Arc<Telemetry>,
}

impl BigFinSystem {
    /// Wires every engine against its in-memory store, sharing one
    /// ledger and one provider across payments and reconciliation so
    /// the two engines observe the same state.
    #[must_use]
    pub fn new_in_memory(webhook_shared_secret: impl Into<Vec<u8>>) -> Self {
        Self::with_audit_hook(webhook_shared_secret, Arc::new(NoopAuditHook))
    }

    #[must_use]
    pub fn with_audit_hook(
        webhook_shared_secret: impl Into<Vec<u8>>,
        audit: Arc<dyn AuditHook>,
    ) -> Self {
        let ledger: Arc<dyn LedgerEngine> = Arc::new(InMemoryLedgerEngine::new());
        let provider = Arc::new(InMemoryPaymentProvider::new());
        let instruments = Arc::new(InMemoryInstrumentStore::new());
        let disbursements = Arc::new(InMemoryDisbursementStore::new());
        let repayments = Arc::new(InMemoryRepaymentStore::new());
        let contracts = Arc::new(InMemoryContractStore::new());
        let prefund = Arc::new(InMemoryPrefundStore::new());
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let policy_store: Arc<dyn PolicyStore> = Arc::new(InMemoryPolicyStore::new());
        let telemetry = Arc::new(Telemetry::new());

        let orchestrator = Arc::new(TransferOrchestrator::new(
            provider.clone(),
            instruments,
            disbursements.clone(),
            repayments.clone(),
            contracts,
            prefund.clone(),
            ledger.clone(),
            idempotency,
            audit.clone(),
        ));

        let reconciliation_store = Arc::new(InMemoryReconciliationStore::new());
        let reconciliation_engine = Arc::new(ReconciliationEngine::new(
            provider,
            disbursements,
            repayments,
            prefund,
            ledger.clone(),
            reconciliation_store,
            audit,
        ));

        let webhook_handler = Arc::new(WebhookHandler::new(
            webhook_shared_secret,
            orchestrator.clone(),
        ));

        Self {
            ledger: LedgerFacade::new(ledger),
            payments: PaymentsFacade::new(orchestrator, telemetry.clone()),
            reconciliation: ReconciliationFacade::new(reconciliation_engine, telemetry.clone()),
            webhooks: WebhooksFacade::new(webhook_handler, telemetry.clone()),
            policy_store,
            telemetry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wires_every_facade_against_shared_in_memory_state() {
        let system = BigFinSystem::new_in_memory(b"demo-secret".to_vec());
        let trial_balance = system
            .ledger
            .get_trial_balance(&"tenant-1".to_string())
            .await
            .expect("trial balance");
        assert!(trial_balance.lines.is_empty());
    }
}
