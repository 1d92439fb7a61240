#![deny(clippy::print_stdout, clippy::print_stderr)]

use chrono::DateTime;
use chrono::Utc;

mod memory;

pub use memory::InMemoryLedgerEngine;

use async_trait::async_trait;

pub type TenantId = String;
pub type AccountCode = String;
pub type JournalId = String;
pub type EntryId = String;
pub type ContractId = String;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("operation rejected: {0}")]
    Rejected(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// The five normal account classes. Normal side follows standard
/// double-entry convention: asset/expense accounts grow on the debit
/// side, everything else grows on the credit side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    #[must_use]
    pub fn normal_side(self) -> PostingSide {
        match self {
            AccountType::Asset | AccountType::Expense => PostingSide::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                PostingSide::Credit
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingSide {
    Debit,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub code: AccountCode,
    pub name: String,
    pub account_type: AccountType,
    pub parent_code: Option<AccountCode>,
    pub is_system: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalType {
    Disbursement,
    Repayment,
    FeeAssessment,
    InterestAccrual,
    Adjustment,
    Reversal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journal {
    pub id: JournalId,
    pub tenant_id: TenantId,
    pub contract_id: Option<ContractId>,
    pub journal_type: JournalType,
    pub description: String,
    pub is_reversal: bool,
    pub reverses_journal_id: Option<JournalId>,
    pub reversed_by_journal_id: Option<JournalId>,
    pub reversal_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub journal_id: JournalId,
    pub account_code: AccountCode,
    pub debit_cents: u64,
    pub credit_cents: u64,
    pub balance_after_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// One line of a not-yet-posted journal. Exactly one of `debit_cents` /
/// `credit_cents` must be nonzero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntryLine {
    pub account_code: AccountCode,
    pub debit_cents: u64,
    pub credit_cents: u64,
}

impl NewEntryLine {
    fn validate(&self) -> LedgerResult<()> {
        match (self.debit_cents > 0, self.credit_cents > 0) {
            (true, false) | (false, true) => Ok(()),
            (true, true) => Err(LedgerError::Validation(format!(
                "entry on {} cannot carry both a debit and a credit",
                self.account_code
            ))),
            (false, false) => Err(LedgerError::Validation(format!(
                "entry on {} must carry a nonzero debit or credit",
                self.account_code
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJournalRequest {
    pub tenant_id: TenantId,
    pub contract_id: Option<ContractId>,
    pub journal_type: JournalType,
    pub description: String,
    pub created_by: String,
    pub lines: Vec<NewEntryLine>,
}

impl CreateJournalRequest {
    fn validate(&self) -> LedgerResult<()> {
        if self.lines.is_empty() {
            return Err(LedgerError::Validation(
                "journal must contain at least one entry".into(),
            ));
        }
        for line in &self.lines {
            line.validate()?;
        }
        let debits: u64 = self.lines.iter().map(|l| l.debit_cents).sum();
        let credits: u64 = self.lines.iter().map(|l| l.credit_cents).sum();
        if debits != credits {
            return Err(LedgerError::Validation(format!(
                "journal does not balance: debits {debits} != credits {credits}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrialBalanceLine {
    pub account_code: AccountCode,
    pub balance_cents: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrialBalance {
    pub lines: Vec<TrialBalanceLine>,
}

impl TrialBalance {
    /// A trial balance is in balance when every account's signed
    /// contribution (debit positive, credit negative against its own
    /// normal side) nets to zero across the whole chart.
    #[must_use]
    pub fn is_balanced(&self, accounts: &[Account]) -> bool {
        let mut net: i64 = 0;
        for line in &self.lines {
            let Some(account) = accounts.iter().find(|a| a.code == line.account_code) else {
                return false;
            };
            net += match account.account_type.normal_side() {
                PostingSide::Debit => line.balance_cents,
                PostingSide::Credit => -line.balance_cents,
            };
        }
        net == 0
    }
}

#[async_trait]
pub trait LedgerEngine: Send + Sync {
    async fn register_account(
        &self,
        tenant_id: &TenantId,
        account: Account,
    ) -> LedgerResult<Account>;

    async fn create_journal(&self, request: CreateJournalRequest) -> LedgerResult<Journal>;

    async fn reverse_journal(
        &self,
        tenant_id: &TenantId,
        journal_id: &JournalId,
        reason: String,
        created_by: String,
    ) -> LedgerResult<Journal>;

    async fn get_account_balance(
        &self,
        tenant_id: &TenantId,
        account_code: &AccountCode,
    ) -> LedgerResult<i64>;

    async fn get_contract_balances(
        &self,
        tenant_id: &TenantId,
        contract_id: &ContractId,
    ) -> LedgerResult<Vec<TrialBalanceLine>>;

    async fn get_trial_balance(&self, tenant_id: &TenantId) -> LedgerResult<TrialBalance>;

    async fn list_accounts(&self, tenant_id: &TenantId) -> LedgerResult<Vec<Account>>;

    async fn get_contract_journals(
        &self,
        tenant_id: &TenantId,
        contract_id: &ContractId,
    ) -> LedgerResult<Vec<Journal>>;

    async fn get_journal_entries(
        &self,
        tenant_id: &TenantId,
        journal_id: &JournalId,
    ) -> LedgerResult<Vec<Entry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_side_matches_double_entry_convention() {
        assert_eq!(AccountType::Asset.normal_side(), PostingSide::Debit);
        assert_eq!(AccountType::Expense.normal_side(), PostingSide::Debit);
        assert_eq!(AccountType::Liability.normal_side(), PostingSide::Credit);
        assert_eq!(AccountType::Equity.normal_side(), PostingSide::Credit);
        assert_eq!(AccountType::Revenue.normal_side(), PostingSide::Credit);
    }

    #[test]
    fn new_entry_line_rejects_both_sides_and_neither_side() {
        let both = NewEntryLine {
            account_code: "1000".into(),
            debit_cents: 100,
            credit_cents: 100,
        };
        assert!(matches!(both.validate(), Err(LedgerError::Validation(_))));

        let neither = NewEntryLine {
            account_code: "1000".into(),
            debit_cents: 0,
            credit_cents: 0,
        };
        assert!(matches!(
            neither.validate(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn create_journal_request_requires_balance() {
        let request = CreateJournalRequest {
            tenant_id: "tenant-1".into(),
            contract_id: None,
            journal_type: JournalType::Adjustment,
            description: "test".into(),
            created_by: "system".into(),
            lines: vec![
                NewEntryLine {
                    account_code: "1000".into(),
                    debit_cents: 500,
                    credit_cents: 0,
                },
                NewEntryLine {
                    account_code: "4000".into(),
                    debit_cents: 0,
                    credit_cents: 400,
                },
            ],
        };
        assert!(matches!(
            request.validate(),
            Err(LedgerError::Validation(_))
        ));
    }
}
