use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ContractId;
use crate::ContractStore;
use crate::CustomerId;
use crate::Disbursement;
use crate::DisbursementId;
use crate::DisbursementStore;
use crate::FundingInstrument;
use crate::InstrumentId;
use crate::InstrumentStore;
use crate::LoanContract;
use crate::PaymentsError;
use crate::PaymentsResult;
use crate::PrefundStore;
use crate::PrefundTransaction;
use crate::PrefundTxnStatus;
use crate::Repayment;
use crate::RepaymentId;
use crate::RepaymentStore;
use crate::TenantId;
use crate::TimeWindow;

#[derive(Default)]
pub struct InMemoryInstrumentStore {
    instruments: Mutex<HashMap<(TenantId, InstrumentId), FundingInstrument>>,
}

impl InMemoryInstrumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstrumentStore for InMemoryInstrumentStore {
    async fn get(&self, tenant_id: &TenantId, id: &InstrumentId) -> PaymentsResult<FundingInstrument> {
        self.instruments
            .lock()
            .await
            .get(&(tenant_id.clone(), id.clone()))
            .cloned()
            .ok_or_else(|| PaymentsError::NotFound(format!("instrument {id}")))
    }

    async fn put(&self, tenant_id: &TenantId, instrument: FundingInstrument) -> PaymentsResult<()> {
        self.instruments
            .lock()
            .await
            .insert((tenant_id.clone(), instrument.id.clone()), instrument);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryContractStore {
    contracts: Mutex<HashMap<(TenantId, ContractId), LoanContract>>,
}

impl InMemoryContractStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContractStore for InMemoryContractStore {
    async fn get(&self, tenant_id: &TenantId, id: &ContractId) -> PaymentsResult<LoanContract> {
        self.contracts
            .lock()
            .await
            .get(&(tenant_id.clone(), id.clone()))
            .cloned()
            .ok_or_else(|| PaymentsError::NotFound(format!("contract {id}")))
    }

    async fn update(&self, contract: LoanContract) -> PaymentsResult<()> {
        self.contracts
            .lock()
            .await
            .insert((contract.tenant_id.clone(), contract.id.clone()), contract);
        Ok(())
    }

    async fn list(&self, tenant_id: &TenantId) -> PaymentsResult<Vec<LoanContract>> {
        Ok(self
            .contracts
            .lock()
            .await
            .iter()
            .filter(|((tid, _), _)| tid == tenant_id)
            .map(|(_, contract)| contract.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryDisbursementStore {
    records: Mutex<HashMap<(TenantId, DisbursementId), Disbursement>>,
}

impl InMemoryDisbursementStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DisbursementStore for InMemoryDisbursementStore {
    async fn insert(&self, disbursement: Disbursement) -> PaymentsResult<()> {
        let mut guard = self.records.lock().await;
        let key = (disbursement.tenant_id.clone(), disbursement.id.clone());
        if guard.contains_key(&key) {
            return Err(PaymentsError::AlreadyExists(format!(
                "disbursement {}",
                disbursement.id
            )));
        }
        guard.insert(key, disbursement);
        Ok(())
    }

    async fn update(&self, disbursement: Disbursement) -> PaymentsResult<()> {
        self.records.lock().await.insert(
            (disbursement.tenant_id.clone(), disbursement.id.clone()),
            disbursement,
        );
        Ok(())
    }

    async fn get(&self, tenant_id: &TenantId, id: &DisbursementId) -> PaymentsResult<Disbursement> {
        self.records
            .lock()
            .await
            .get(&(tenant_id.clone(), id.clone()))
            .cloned()
            .ok_or_else(|| PaymentsError::NotFound(format!("disbursement {id}")))
    }

    async fn get_by_provider_ref(
        &self,
        tenant_id: &TenantId,
        provider_ref: &str,
    ) -> PaymentsResult<Option<Disbursement>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .find(|d| &d.tenant_id == tenant_id && d.provider_ref.as_deref() == Some(provider_ref))
            .cloned())
    }

    async fn list_in_window(
        &self,
        tenant_id: &TenantId,
        window: TimeWindow,
    ) -> PaymentsResult<Vec<Disbursement>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|d| &d.tenant_id == tenant_id)
            .filter(|d| d.initiated_at.is_some_and(|at| window.contains(at)))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryRepaymentStore {
    records: Mutex<HashMap<(TenantId, RepaymentId), Repayment>>,
}

impl InMemoryRepaymentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RepaymentStore for InMemoryRepaymentStore {
    async fn insert(&self, repayment: Repayment) -> PaymentsResult<()> {
        let mut guard = self.records.lock().await;
        let key = (repayment.tenant_id.clone(), repayment.id.clone());
        if guard.contains_key(&key) {
            return Err(PaymentsError::AlreadyExists(format!(
                "repayment {}",
                repayment.id
            )));
        }
        guard.insert(key, repayment);
        Ok(())
    }

    async fn update(&self, repayment: Repayment) -> PaymentsResult<()> {
        self.records
            .lock()
            .await
            .insert((repayment.tenant_id.clone(), repayment.id.clone()), repayment);
        Ok(())
    }

    async fn get(&self, tenant_id: &TenantId, id: &RepaymentId) -> PaymentsResult<Repayment> {
        self.records
            .lock()
            .await
            .get(&(tenant_id.clone(), id.clone()))
            .cloned()
            .ok_or_else(|| PaymentsError::NotFound(format!("repayment {id}")))
    }

    async fn get_by_provider_ref(
        &self,
        tenant_id: &TenantId,
        provider_ref: &str,
    ) -> PaymentsResult<Option<Repayment>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .find(|r| &r.tenant_id == tenant_id && r.provider_ref.as_deref() == Some(provider_ref))
            .cloned())
    }

    async fn list_in_window(
        &self,
        tenant_id: &TenantId,
        window: TimeWindow,
    ) -> PaymentsResult<Vec<Repayment>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|r| &r.tenant_id == tenant_id)
            .filter(|r| r.initiated_at.is_some_and(|at| window.contains(at)))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryPrefundStore {
    txns: Mutex<HashMap<TenantId, Vec<PrefundTransaction>>>,
}

impl InMemoryPrefundStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrefundStore for InMemoryPrefundStore {
    async fn append(&self, txn: PrefundTransaction) -> PaymentsResult<()> {
        self.txns
            .lock()
            .await
            .entry(txn.tenant_id.clone())
            .or_default()
            .push(txn);
        Ok(())
    }

    async fn latest_completed(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
    ) -> PaymentsResult<Option<PrefundTransaction>> {
        Ok(self
            .txns
            .lock()
            .await
            .get(tenant_id)
            .into_iter()
            .flatten()
            .filter(|t| &t.customer_id == customer_id && t.status == PrefundTxnStatus::Completed)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn all_completed(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
    ) -> PaymentsResult<Vec<PrefundTransaction>> {
        let mut matching: Vec<PrefundTransaction> = self
            .txns
            .lock()
            .await
            .get(tenant_id)
            .into_iter()
            .flatten()
            .filter(|t| &t.customer_id == customer_id && t.status == PrefundTxnStatus::Completed)
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.created_at);
        Ok(matching)
    }

    async fn customers_with_activity(&self, tenant_id: &TenantId) -> PaymentsResult<Vec<CustomerId>> {
        let mut customers: Vec<CustomerId> = self
            .txns
            .lock()
            .await
            .get(tenant_id)
            .into_iter()
            .flatten()
            .map(|t| t.customer_id.clone())
            .collect();
        customers.sort();
        customers.dedup();
        Ok(customers)
    }
}
