use std::collections::HashMap;
use std::sync::RwLock;

use crate::ReconcileError;
use crate::ReconcileResult;
use crate::ReconciliationRun;
use crate::ReconciliationStore;
use crate::RunId;
use crate::TenantId;

/// In-memory `ReconciliationStore`. Runs are immutable once saved, so
/// this is an append-only map keyed by `(tenant_id, run_id)`.
#[derive(Default)]
pub struct InMemoryReconciliationStore {
    runs: RwLock<HashMap<(TenantId, RunId), ReconciliationRun>>,
}

impl InMemoryReconciliationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReconciliationStore for InMemoryReconciliationStore {
    fn save_run(&self, run: ReconciliationRun) -> ReconcileResult<()> {
        let mut guard = self
            .runs
            .write()
            .map_err(|_| ReconcileError::Storage("reconciliation run store poisoned".into()))?;
        guard.insert((run.tenant_id.clone(), run.id.clone()), run);
        Ok(())
    }

    fn get_run(&self, tenant_id: &TenantId, run_id: &RunId) -> ReconcileResult<ReconciliationRun> {
        let guard = self
            .runs
            .read()
            .map_err(|_| ReconcileError::Storage("reconciliation run store poisoned".into()))?;
        guard
            .get(&(tenant_id.clone(), run_id.clone()))
            .cloned()
            .ok_or_else(|| ReconcileError::RunNotFound(run_id.clone()))
    }

    fn list_runs(&self, tenant_id: &TenantId) -> ReconcileResult<Vec<ReconciliationRun>> {
        let guard = self
            .runs
            .read()
            .map_err(|_| ReconcileError::Storage("reconciliation run store poisoned".into()))?;
        let mut runs: Vec<ReconciliationRun> = guard
            .iter()
            .filter(|((tid, _), _)| tid == tenant_id)
            .map(|(_, run)| run.clone())
            .collect();
        runs.sort_by_key(|run| run.started_at);
        Ok(runs)
    }
}

#[cfg(feature = "postgres-store")]
#[derive(Clone)]
pub struct PostgresReconciliationStore {
    connection_string: String,
}

#[cfg(feature = "postgres-store")]
impl PostgresReconciliationStore {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

#[cfg(feature = "postgres-store")]
impl ReconciliationStore for PostgresReconciliationStore {
    fn save_run(&self, run: ReconciliationRun) -> ReconcileResult<()> {
        let _ = (&self.connection_string, &run);
        Err(ReconcileError::Storage(
            "postgres reconciliation store not yet implemented".into(),
        ))
    }

    fn get_run(&self, tenant_id: &TenantId, run_id: &RunId) -> ReconcileResult<ReconciliationRun> {
        let _ = (&self.connection_string, tenant_id, run_id);
        Err(ReconcileError::Storage(
            "postgres reconciliation store not yet implemented".into(),
        ))
    }

    fn list_runs(&self, tenant_id: &TenantId) -> ReconcileResult<Vec<ReconciliationRun>> {
        let _ = (&self.connection_string, tenant_id);
        Err(ReconcileError::Storage(
            "postgres reconciliation store not yet implemented".into(),
        ))
    }
}
