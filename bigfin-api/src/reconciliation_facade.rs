use std::sync::Arc;

use bigfin_policy::ReconciliationPolicy;
use bigfin_reconcile::ReconciliationEngine;
use bigfin_reconcile::ReconciliationRun;
use bigfin_reconcile::RunRequest;

use crate::error::ApiResult;
use crate::telemetry::Telemetry;

/// Thin pass-through over [`ReconciliationEngine`] that records
/// telemetry and converts domain errors into the wire-facing taxonomy.
#[derive(Clone)]
pub struct ReconciliationFacade {
    engine: Arc<ReconciliationEngine>,
    telemetry: Arc<Telemetry>,
}

impl ReconciliationFacade {
    #[must_use]
    pub fn new(engine: Arc<ReconciliationEngine>, telemetry: Arc<Telemetry>) -> Self {
        Self { engine, telemetry }
    }

    pub async fn run(
        &self,
        request: RunRequest,
        policy: &ReconciliationPolicy,
    ) -> ApiResult<ReconciliationRun> {
        let run = self.engine.run(request, policy).await?;
        self.telemetry
            .record_reconciliation_run(run.exceptions.len(), run.auto_resolved_count);
        Ok(run)
    }
}
