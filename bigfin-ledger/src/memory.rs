use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::Account;
use crate::AccountCode;
use crate::ContractId;
use crate::CreateJournalRequest;
use crate::Entry;
use crate::EntryId;
use crate::Journal;
use crate::JournalId;
use crate::JournalType;
use crate::LedgerEngine;
use crate::LedgerError;
use crate::LedgerResult;
use crate::NewEntryLine;
use crate::PostingSide;
use crate::TenantId;
use crate::TrialBalance;
use crate::TrialBalanceLine;

/// In-memory `LedgerEngine`. Guards all state behind a single
/// `tokio::sync::Mutex`, matching the coarse-grained locking strategy the
/// teacher's own in-memory ledger uses; per-account lock ordering only
/// matters once postings are split across independent locks, which a
/// durable-store-backed implementation would need and this one does not.
#[derive(Default)]
pub struct InMemoryLedgerEngine {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    accounts: HashMap<(TenantId, AccountCode), Account>,
    journals: HashMap<(TenantId, JournalId), Journal>,
    journal_order: Vec<(TenantId, JournalId)>,
    entries_by_journal: HashMap<JournalId, Vec<EntryId>>,
    entries_by_account: HashMap<(TenantId, AccountCode), Vec<EntryId>>,
    entries: HashMap<EntryId, Entry>,
}

impl InMemoryLedgerEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn account_exists(state: &State, tenant_id: &TenantId, code: &AccountCode) -> bool {
        state
            .accounts
            .contains_key(&(tenant_id.clone(), code.clone()))
    }

    fn last_balance(state: &State, tenant_id: &TenantId, code: &AccountCode) -> i64 {
        state
            .entries_by_account
            .get(&(tenant_id.clone(), code.clone()))
            .and_then(|ids| ids.last())
            .and_then(|id| state.entries.get(id))
            .map_or(0, |entry| entry.balance_after_cents)
    }

    /// Appends a balanced set of lines as entries, cascading each
    /// account's running balance from its own prior entry. Shared by
    /// `create_journal` and `reverse_journal` so both paths compute
    /// `balance_after_cents` the same way: by full replay against the
    /// account's accumulated entry history, never by reusing or negating
    /// a previously recorded value.
    fn append_lines(
        state: &mut State,
        tenant_id: &TenantId,
        journal_id: &JournalId,
        lines: &[NewEntryLine],
    ) -> LedgerResult<()> {
        for line in lines {
            let account = state
                .accounts
                .get(&(tenant_id.clone(), line.account_code.clone()))
                .ok_or_else(|| LedgerError::NotFound(format!("account {}", line.account_code)))?;
            let normal_side = account.account_type.normal_side();

            let delta: i64 = if line.debit_cents > 0 {
                match normal_side {
                    PostingSide::Debit => line.debit_cents as i64,
                    PostingSide::Credit => -(line.debit_cents as i64),
                }
            } else {
                match normal_side {
                    PostingSide::Credit => line.credit_cents as i64,
                    PostingSide::Debit => -(line.credit_cents as i64),
                }
            };

            let previous = Self::last_balance(state, tenant_id, &line.account_code);
            let entry_id = Uuid::new_v4().to_string();
            let entry = Entry {
                id: entry_id.clone(),
                journal_id: journal_id.clone(),
                account_code: line.account_code.clone(),
                debit_cents: line.debit_cents,
                credit_cents: line.credit_cents,
                balance_after_cents: previous + delta,
                created_at: Utc::now(),
            };

            state
                .entries_by_account
                .entry((tenant_id.clone(), line.account_code.clone()))
                .or_default()
                .push(entry_id.clone());
            state
                .entries_by_journal
                .entry(journal_id.clone())
                .or_default()
                .push(entry_id.clone());
            state.entries.insert(entry_id, entry);
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerEngine for InMemoryLedgerEngine {
    async fn register_account(
        &self,
        tenant_id: &TenantId,
        account: Account,
    ) -> LedgerResult<Account> {
        let mut state = self.state.lock().await;
        let key = (tenant_id.clone(), account.code.clone());
        if state.accounts.contains_key(&key) {
            return Err(LedgerError::Validation(format!(
                "account {} already exists",
                account.code
            )));
        }
        if let Some(parent_code) = &account.parent_code {
            if !Self::account_exists(&state, tenant_id, parent_code) {
                return Err(LedgerError::NotFound(format!(
                    "parent account {parent_code}"
                )));
            }
        }
        state.accounts.insert(key, account.clone());
        Ok(account)
    }

    async fn create_journal(&self, request: CreateJournalRequest) -> LedgerResult<Journal> {
        request.validate()?;
        let mut state = self.state.lock().await;

        let mut codes: Vec<&AccountCode> = request
            .lines
            .iter()
            .map(|line| &line.account_code)
            .collect();
        codes.sort();
        for code in codes {
            if !Self::account_exists(&state, &request.tenant_id, code) {
                return Err(LedgerError::NotFound(format!("account {code}")));
            }
        }

        let journal_id = Uuid::new_v4().to_string();
        let journal = Journal {
            id: journal_id.clone(),
            tenant_id: request.tenant_id.clone(),
            contract_id: request.contract_id.clone(),
            journal_type: request.journal_type,
            description: request.description.clone(),
            is_reversal: false,
            reverses_journal_id: None,
            reversed_by_journal_id: None,
            reversal_reason: None,
            created_by: request.created_by.clone(),
            created_at: Utc::now(),
        };

        Self::append_lines(&mut state, &request.tenant_id, &journal_id, &request.lines)?;

        state.journals.insert(
            (request.tenant_id.clone(), journal_id.clone()),
            journal.clone(),
        );
        state.journal_order.push((request.tenant_id, journal_id));

        Ok(journal)
    }

    async fn reverse_journal(
        &self,
        tenant_id: &TenantId,
        journal_id: &JournalId,
        reason: String,
        created_by: String,
    ) -> LedgerResult<Journal> {
        let mut state = self.state.lock().await;
        let key = (tenant_id.clone(), journal_id.clone());

        let original = state
            .journals
            .get(&key)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("journal {journal_id}")))?;

        if original.is_reversal {
            return Err(LedgerError::Rejected(
                "cannot reverse a reversal journal".into(),
            ));
        }
        if original.reversed_by_journal_id.is_some() {
            return Err(LedgerError::Rejected("journal already reversed".into()));
        }

        let entry_ids = state
            .entries_by_journal
            .get(journal_id)
            .cloned()
            .unwrap_or_default();
        let swapped_lines: Vec<NewEntryLine> = entry_ids
            .iter()
            .filter_map(|id| state.entries.get(id))
            .map(|entry| NewEntryLine {
                account_code: entry.account_code.clone(),
                debit_cents: entry.credit_cents,
                credit_cents: entry.debit_cents,
            })
            .collect();

        let reversal_id = Uuid::new_v4().to_string();
        let reversal = Journal {
            id: reversal_id.clone(),
            tenant_id: tenant_id.clone(),
            contract_id: original.contract_id.clone(),
            journal_type: JournalType::Reversal,
            description: format!("Reversal of {journal_id}: {reason}"),
            is_reversal: true,
            reverses_journal_id: Some(original.id.clone()),
            reversed_by_journal_id: None,
            reversal_reason: Some(reason),
            created_by,
            created_at: Utc::now(),
        };

        Self::append_lines(&mut state, tenant_id, &reversal_id, &swapped_lines)?;

        state
            .journals
            .insert((tenant_id.clone(), reversal_id.clone()), reversal.clone());
        state
            .journal_order
            .push((tenant_id.clone(), reversal_id.clone()));

        if let Some(stored) = state.journals.get_mut(&key) {
            stored.reversed_by_journal_id = Some(reversal_id);
        }

        Ok(reversal)
    }

    async fn get_account_balance(
        &self,
        tenant_id: &TenantId,
        account_code: &AccountCode,
    ) -> LedgerResult<i64> {
        let state = self.state.lock().await;
        if !Self::account_exists(&state, tenant_id, account_code) {
            return Err(LedgerError::NotFound(format!("account {account_code}")));
        }
        Ok(Self::last_balance(&state, tenant_id, account_code))
    }

    async fn get_contract_balances(
        &self,
        tenant_id: &TenantId,
        contract_id: &ContractId,
    ) -> LedgerResult<Vec<TrialBalanceLine>> {
        let state = self.state.lock().await;
        let mut codes: Vec<AccountCode> = Vec::new();
        for (key, journal) in &state.journals {
            if &key.0 == tenant_id && journal.contract_id.as_ref() == Some(contract_id) {
                for entry_id in state
                    .entries_by_journal
                    .get(&journal.id)
                    .into_iter()
                    .flatten()
                {
                    if let Some(entry) = state.entries.get(entry_id) {
                        if !codes.contains(&entry.account_code) {
                            codes.push(entry.account_code.clone());
                        }
                    }
                }
            }
        }
        codes.sort();
        Ok(codes
            .into_iter()
            .map(|code| {
                let balance_cents = Self::last_balance(&state, tenant_id, &code);
                TrialBalanceLine {
                    account_code: code,
                    balance_cents,
                }
            })
            .collect())
    }

    async fn get_trial_balance(&self, tenant_id: &TenantId) -> LedgerResult<TrialBalance> {
        let state = self.state.lock().await;
        let mut lines: Vec<TrialBalanceLine> = state
            .accounts
            .keys()
            .filter(|(tid, _)| tid == tenant_id)
            .map(|(_, code)| TrialBalanceLine {
                account_code: code.clone(),
                balance_cents: Self::last_balance(&state, tenant_id, code),
            })
            .collect();
        lines.sort_by(|a, b| a.account_code.cmp(&b.account_code));
        Ok(TrialBalance { lines })
    }

    async fn list_accounts(&self, tenant_id: &TenantId) -> LedgerResult<Vec<Account>> {
        let state = self.state.lock().await;
        let mut accounts: Vec<Account> = state
            .accounts
            .iter()
            .filter(|((tid, _), _)| tid == tenant_id)
            .map(|(_, account)| account.clone())
            .collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn get_contract_journals(
        &self,
        tenant_id: &TenantId,
        contract_id: &ContractId,
    ) -> LedgerResult<Vec<Journal>> {
        let state = self.state.lock().await;
        Ok(state
            .journal_order
            .iter()
            .filter(|(tid, _)| tid == tenant_id)
            .filter_map(|key| state.journals.get(key))
            .filter(|journal| journal.contract_id.as_ref() == Some(contract_id))
            .cloned()
            .collect())
    }

    async fn get_journal_entries(
        &self,
        tenant_id: &TenantId,
        journal_id: &JournalId,
    ) -> LedgerResult<Vec<Entry>> {
        let state = self.state.lock().await;
        if !state
            .journals
            .contains_key(&(tenant_id.clone(), journal_id.clone()))
        {
            return Err(LedgerError::NotFound(format!("journal {journal_id}")));
        }
        Ok(state
            .entries_by_journal
            .get(journal_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.entries.get(id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccountType;
    use pretty_assertions::assert_eq;

    async fn seeded() -> InMemoryLedgerEngine {
        let ledger = InMemoryLedgerEngine::new();
        let tenant = "tenant-1".to_string();
        ledger
            .register_account(
                &tenant,
                Account {
                    code: "1000".into(),
                    name: "Cash".into(),
                    account_type: AccountType::Asset,
                    parent_code: None,
                    is_system: true,
                },
            )
            .await
            .expect("register cash");
        ledger
            .register_account(
                &tenant,
                Account {
                    code: "1100".into(),
                    name: "Loans Receivable".into(),
                    account_type: AccountType::Asset,
                    parent_code: None,
                    is_system: true,
                },
            )
            .await
            .expect("register receivable");
        ledger
            .register_account(
                &tenant,
                Account {
                    code: "4000".into(),
                    name: "Interest Income".into(),
                    account_type: AccountType::Revenue,
                    parent_code: None,
                    is_system: true,
                },
            )
            .await
            .expect("register revenue");
        ledger
    }

    fn disbursement_request(tenant: &str) -> CreateJournalRequest {
        CreateJournalRequest {
            tenant_id: tenant.to_string(),
            contract_id: Some("contract-1".into()),
            journal_type: JournalType::Disbursement,
            description: "Disbursement".into(),
            created_by: "system".into(),
            lines: vec![
                NewEntryLine {
                    account_code: "1100".into(),
                    debit_cents: 100_000,
                    credit_cents: 0,
                },
                NewEntryLine {
                    account_code: "1000".into(),
                    debit_cents: 0,
                    credit_cents: 100_000,
                },
            ],
        }
    }

    #[tokio::test]
    async fn create_journal_cascades_running_balance() {
        let ledger = seeded().await;
        let tenant = "tenant-1".to_string();

        ledger
            .create_journal(disbursement_request(&tenant))
            .await
            .expect("post disbursement");

        assert_eq!(
            ledger
                .get_account_balance(&tenant, &"1100".to_string())
                .await
                .expect("receivable balance"),
            100_000
        );
        assert_eq!(
            ledger
                .get_account_balance(&tenant, &"1000".to_string())
                .await
                .expect("cash balance"),
            -100_000
        );
    }

    #[tokio::test]
    async fn reverse_journal_swaps_sides_and_marks_original() {
        let ledger = seeded().await;
        let tenant = "tenant-1".to_string();

        let journal = ledger
            .create_journal(disbursement_request(&tenant))
            .await
            .expect("post disbursement");

        let reversal = ledger
            .reverse_journal(
                &tenant,
                &journal.id,
                "booked in error".into(),
                "ops-1".into(),
            )
            .await
            .expect("reverse journal");

        assert_eq!(reversal.reverses_journal_id, Some(journal.id.clone()));
        assert!(reversal.is_reversal);

        assert_eq!(
            ledger
                .get_account_balance(&tenant, &"1100".to_string())
                .await
                .expect("receivable balance"),
            0
        );
        assert_eq!(
            ledger
                .get_account_balance(&tenant, &"1000".to_string())
                .await
                .expect("cash balance"),
            0
        );

        let entries = ledger
            .get_journal_entries(&tenant, &journal.id)
            .await
            .expect("original entries unchanged");
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn reversal_cannot_be_reversed_again() {
        let ledger = seeded().await;
        let tenant = "tenant-1".to_string();

        let journal = ledger
            .create_journal(disbursement_request(&tenant))
            .await
            .expect("post disbursement");
        let reversal = ledger
            .reverse_journal(&tenant, &journal.id, "error".into(), "ops-1".into())
            .await
            .expect("reverse journal");

        let second = ledger
            .reverse_journal(&tenant, &journal.id, "error again".into(), "ops-1".into())
            .await;
        assert!(matches!(second, Err(LedgerError::Rejected(_))));

        let reverse_the_reversal = ledger
            .reverse_journal(&tenant, &reversal.id, "oops".into(), "ops-1".into())
            .await;
        assert!(matches!(
            reverse_the_reversal,
            Err(LedgerError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn reversal_after_interleaved_journal_replays_full_history() {
        let ledger = seeded().await;
        let tenant = "tenant-1".to_string();

        let journal = ledger
            .create_journal(disbursement_request(&tenant))
            .await
            .expect("post disbursement");

        // A second, unrelated journal lands on the same cash account
        // before the first is reversed.
        ledger
            .create_journal(CreateJournalRequest {
                tenant_id: tenant.clone(),
                contract_id: Some("contract-2".into()),
                journal_type: JournalType::Disbursement,
                description: "Unrelated disbursement".into(),
                created_by: "system".into(),
                lines: vec![
                    NewEntryLine {
                        account_code: "1100".into(),
                        debit_cents: 25_000,
                        credit_cents: 0,
                    },
                    NewEntryLine {
                        account_code: "1000".into(),
                        debit_cents: 0,
                        credit_cents: 25_000,
                    },
                ],
            })
            .await
            .expect("post second disbursement");

        ledger
            .reverse_journal(
                &tenant,
                &journal.id,
                "booked in error".into(),
                "ops-1".into(),
            )
            .await
            .expect("reverse journal");

        // Cash should reflect only the still-standing second journal: the
        // reversal must be computed against the full history, not a stale
        // per-journal snapshot.
        assert_eq!(
            ledger
                .get_account_balance(&tenant, &"1000".to_string())
                .await
                .expect("cash balance"),
            -25_000
        );
        assert_eq!(
            ledger
                .get_account_balance(&tenant, &"1100".to_string())
                .await
                .expect("receivable balance"),
            25_000
        );
    }

    #[tokio::test]
    async fn trial_balance_nets_to_zero() {
        let ledger = seeded().await;
        let tenant = "tenant-1".to_string();
        ledger
            .create_journal(disbursement_request(&tenant))
            .await
            .expect("post disbursement");

        ledger
            .create_journal(CreateJournalRequest {
                tenant_id: tenant.clone(),
                contract_id: Some("contract-1".into()),
                journal_type: JournalType::InterestAccrual,
                description: "Accrue interest".into(),
                created_by: "system".into(),
                lines: vec![
                    NewEntryLine {
                        account_code: "1100".into(),
                        debit_cents: 500,
                        credit_cents: 0,
                    },
                    NewEntryLine {
                        account_code: "4000".into(),
                        debit_cents: 0,
                        credit_cents: 500,
                    },
                ],
            })
            .await
            .expect("accrue interest");

        let trial_balance = ledger
            .get_trial_balance(&tenant)
            .await
            .expect("trial balance");
        let accounts = vec![
            Account {
                code: "1000".into(),
                name: "Cash".into(),
                account_type: AccountType::Asset,
                parent_code: None,
                is_system: true,
            },
            Account {
                code: "1100".into(),
                name: "Loans Receivable".into(),
                account_type: AccountType::Asset,
                parent_code: None,
                is_system: true,
            },
            Account {
                code: "4000".into(),
                name: "Interest Income".into(),
                account_type: AccountType::Revenue,
                parent_code: None,
                is_system: true,
            },
        ];
        assert!(trial_balance.is_balanced(&accounts));
    }

    #[tokio::test]
    async fn contract_balances_scope_to_contract_journals() {
        let ledger = seeded().await;
        let tenant = "tenant-1".to_string();
        ledger
            .create_journal(disbursement_request(&tenant))
            .await
            .expect("post disbursement");

        let balances = ledger
            .get_contract_balances(&tenant, &"contract-1".to_string())
            .await
            .expect("contract balances");
        assert_eq!(balances.len(), 2);
        assert_eq!(
            balances
                .iter()
                .find(|line| line.account_code == "1100")
                .map(|line| line.balance_cents),
            Some(100_000)
        );
    }
}
