use std::sync::Arc;

use bigfin_payments::InitiateTransferInput;
use bigfin_payments::StatusUpdate;
use bigfin_payments::TenantId;
use bigfin_payments::TransferOrchestrator;
use bigfin_payments::TransferResult;
use bigfin_policy::ProductPolicy;

use crate::error::ApiResult;
use crate::telemetry::Telemetry;

/// Thin pass-through over [`TransferOrchestrator`] that records
/// telemetry and converts domain errors into the wire-facing taxonomy.
#[derive(Clone)]
pub struct PaymentsFacade {
    orchestrator: Arc<TransferOrchestrator>,
    telemetry: Arc<Telemetry>,
}

impl PaymentsFacade {
    #[must_use]
    pub fn new(orchestrator: Arc<TransferOrchestrator>, telemetry: Arc<Telemetry>) -> Self {
        Self {
            orchestrator,
            telemetry,
        }
    }

    pub async fn initiate(
        &self,
        tenant_id: &TenantId,
        policy: &ProductPolicy,
        input: InitiateTransferInput,
    ) -> ApiResult<TransferResult> {
        let kind = input.kind;
        let result = self.orchestrator.initiate(tenant_id, policy, input).await?;
        match kind {
            bigfin_payments::TransferKind::Disbursement => {
                self.telemetry.record_disbursement_initiated();
            }
            bigfin_payments::TransferKind::Repayment => {
                self.telemetry.record_repayment_initiated();
            }
        }
        Ok(result)
    }

    pub async fn process_status_update(&self, update: StatusUpdate) -> ApiResult<()> {
        self.orchestrator.process_status_update(update).await?;
        self.telemetry.record_transfer_status_update();
        Ok(())
    }

    pub async fn get(
        &self,
        tenant_id: &TenantId,
        provider_ref: &str,
    ) -> ApiResult<Option<TransferResult>> {
        Ok(self.orchestrator.get(tenant_id, provider_ref).await?)
    }

    pub async fn cancel(&self, tenant_id: &TenantId, provider_ref: &str) -> ApiResult<()> {
        Ok(self.orchestrator.cancel(tenant_id, provider_ref).await?)
    }
}
