use std::sync::Arc;

use bigfin_ledger::Account;
use bigfin_ledger::AccountCode;
use bigfin_ledger::ContractId;
use bigfin_ledger::CreateJournalRequest;
use bigfin_ledger::Entry;
use bigfin_ledger::Journal;
use bigfin_ledger::JournalId;
use bigfin_ledger::LedgerEngine;
use bigfin_ledger::TenantId;
use bigfin_ledger::TrialBalance;
use bigfin_ledger::TrialBalanceLine;

use crate::error::ApiResult;

/// Thin pass-through over [`LedgerEngine`] that converts domain errors
/// into the wire-facing taxonomy. Carries no state of its own.
#[derive(Clone)]
pub struct LedgerFacade {
    engine: Arc<dyn LedgerEngine>,
}

impl LedgerFacade {
    #[must_use]
    pub fn new(engine: Arc<dyn LedgerEngine>) -> Self {
        Self { engine }
    }

    pub async fn register_account(
        &self,
        tenant_id: &TenantId,
        account: Account,
    ) -> ApiResult<Account> {
        Ok(self.engine.register_account(tenant_id, account).await?)
    }

    pub async fn create_journal(&self, request: CreateJournalRequest) -> ApiResult<Journal> {
        Ok(self.engine.create_journal(request).await?)
    }

    pub async fn reverse_journal(
        &self,
        tenant_id: &TenantId,
        journal_id: &JournalId,
        reason: String,
        created_by: String,
    ) -> ApiResult<Journal> {
        Ok(self
            .engine
            .reverse_journal(tenant_id, journal_id, reason, created_by)
            .await?)
    }

    pub async fn get_account_balance(
        &self,
        tenant_id: &TenantId,
        account_code: &AccountCode,
    ) -> ApiResult<i64> {
        Ok(self
            .engine
            .get_account_balance(tenant_id, account_code)
            .await?)
    }

    pub async fn get_contract_balances(
        &self,
        tenant_id: &TenantId,
        contract_id: &ContractId,
    ) -> ApiResult<Vec<TrialBalanceLine>> {
        Ok(self
            .engine
            .get_contract_balances(tenant_id, contract_id)
            .await?)
    }

    pub async fn get_trial_balance(&self, tenant_id: &TenantId) -> ApiResult<TrialBalance> {
        Ok(self.engine.get_trial_balance(tenant_id).await?)
    }

    pub async fn list_accounts(&self, tenant_id: &TenantId) -> ApiResult<Vec<Account>> {
        Ok(self.engine.list_accounts(tenant_id).await?)
    }

    pub async fn get_contract_journals(
        &self,
        tenant_id: &TenantId,
        contract_id: &ContractId,
    ) -> ApiResult<Vec<Journal>> {
        Ok(self
            .engine
            .get_contract_journals(tenant_id, contract_id)
            .await?)
    }

    pub async fn get_journal_entries(
        &self,
        tenant_id: &TenantId,
        journal_id: &JournalId,
    ) -> ApiResult<Vec<Entry>> {
        Ok(self
            .engine
            .get_journal_entries(tenant_id, journal_id)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use bigfin_ledger::AccountType;
    use bigfin_ledger::InMemoryLedgerEngine;
    use bigfin_ledger::NewEntryLine;
    use pretty_assertions::assert_eq;

    use super::*;

    fn facade() -> LedgerFacade {
        LedgerFacade::new(Arc::new(InMemoryLedgerEngine::new()))
    }

    #[tokio::test]
    async fn unbalanced_journal_maps_to_invalid_request() {
        let facade = facade();
        let tenant_id = "tenant-1".to_string();
        facade
            .register_account(
                &tenant_id,
                Account {
                    code: "1000".into(),
                    name: "Cash".into(),
                    account_type: AccountType::Asset,
                    parent_code: None,
                    is_system: false,
                },
            )
            .await
            .expect("register account");

        let result = facade
            .create_journal(CreateJournalRequest {
                tenant_id,
                contract_id: None,
                journal_type: bigfin_ledger::JournalType::Adjustment,
                description: "unbalanced".into(),
                created_by: "system".into(),
                lines: vec![NewEntryLine {
                    account_code: "1000".into(),
                    debit_cents: 500,
                    credit_cents: 0,
                }],
            })
            .await;

        assert_eq!(
            result.unwrap_err().code,
            crate::error::ApiErrorCode::InvalidRequest
        );
    }
}
