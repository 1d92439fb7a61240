#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Funding instruments, disbursements, repayments, prefund transactions,
//! the `PaymentProvider` port, and the transfer orchestrator that ties
//! them to the routing engine and the ledger.

use async_trait::async_trait;
use bigfin_routing::Rail;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;

mod memory;
mod orchestrator;
mod provider;
mod waterfall;

pub use memory::InMemoryContractStore;
pub use memory::InMemoryDisbursementStore;
pub use memory::InMemoryInstrumentStore;
pub use memory::InMemoryPrefundStore;
pub use memory::InMemoryRepaymentStore;
pub use orchestrator::InitiateTransferInput;
pub use orchestrator::StatusUpdate;
pub use orchestrator::TransferDirection;
pub use orchestrator::TransferKind;
pub use orchestrator::TransferOrchestrator;
pub use orchestrator::TransferResult;
pub use provider::CreateTransferRequest;
pub use provider::InMemoryPaymentProvider;
pub use provider::PaymentProvider;
pub use provider::ProviderPaymentMethod;
pub use provider::ProviderStatus;
pub use provider::ProviderTransfer;
pub use provider::ProviderTransferRecord;
pub use provider::TimeWindow;
pub use waterfall::WaterfallSplit;
pub use waterfall::apply_waterfall;

pub type TenantId = bigfin_tenancy::TenantId;
pub type CustomerId = String;
pub type ContractId = String;
pub type InstrumentId = String;
pub type DisbursementId = String;
pub type RepaymentId = String;
pub type PrefundTxnId = String;

pub type PaymentsResult<T> = Result<T, PaymentsError>;

#[derive(Debug, thiserror::Error)]
pub enum PaymentsError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("resource already exists: {0}")]
    AlreadyExists(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("instrument invalid: {0}")]
    InstrumentInvalid(String),
    #[error("payment failed: {0}")]
    PaymentFailed(String),
    #[error("payment returned: {0}")]
    PaymentReturned(String),
    #[error("provider error: attempted rails [{attempted_rails}]: {message}")]
    ProviderError {
        attempted_rails: String,
        message: String,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<bigfin_ledger::LedgerError> for PaymentsError {
    fn from(value: bigfin_ledger::LedgerError) -> Self {
        PaymentsError::Internal(format!("ledger: {value}"))
    }
}

impl From<bigfin_tenancy::TenancyError> for PaymentsError {
    fn from(value: bigfin_tenancy::TenancyError) -> Self {
        PaymentsError::Internal(format!("tenancy: {value}"))
    }
}

/// Account code constants used by the ledger transaction templates this
/// crate posts. A real deployment loads the chart of accounts dynamically;
/// these are the fixed system accounts the templates in §4.1 name.
pub mod accounts {
    pub const CASH_OPERATING: &str = "Cash:Operating";
    pub const CASH_PREFUND: &str = "Cash:Prefund";
    pub const LOANS_PRINCIPAL: &str = "Loans:Principal";
    pub const LOANS_INTEREST: &str = "Loans:Interest";
    pub const LOANS_FEES: &str = "Loans:Fees";
    pub const PREFUND_BALANCES: &str = "Prefund_Balances";
    pub const LIABILITIES_PREFUND_BALANCES: &str = "Liabilities:Prefund_Balances";
    pub const REVENUE_FEES_EXPRESS: &str = "Revenue:Fees:Express";
    pub const REVENUE_FEES_LATE: &str = "Revenue:Fees:Late";
    pub const REVENUE_FEES_NSF: &str = "Revenue:Fees:Nsf";
    pub const REVENUE_INTEREST_INCOME: &str = "Revenue:Interest_Income";
    pub const EXPENSES_BAD_DEBT: &str = "Expenses:Bad_Debt";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentType {
    BankAccount,
    DebitCard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentStatus {
    Pending,
    Verified,
    Removed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingInstrument {
    pub id: InstrumentId,
    pub customer_id: CustomerId,
    pub instrument_type: InstrumentType,
    pub status: InstrumentStatus,
    pub provider_ref: Option<String>,
    pub supported_rails: Option<Vec<Rail>>,
}

impl FundingInstrument {
    /// Derives the available rail set for this instrument, per §4.2: an
    /// explicit `supported_rails` list wins verbatim; otherwise fall
    /// back to type/verification defaults.
    #[must_use]
    pub fn available_rails(&self) -> Vec<Rail> {
        if let Some(explicit) = &self.supported_rails {
            return explicit.clone();
        }
        match (self.instrument_type, self.status) {
            (InstrumentType::BankAccount, InstrumentStatus::Verified) => {
                vec![Rail::Rtp, Rail::Fednow, Rail::SameDayAch, Rail::Ach]
            }
            (InstrumentType::BankAccount, _) => vec![Rail::Ach],
            (InstrumentType::DebitCard, _) => vec![Rail::PushToCard],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Initiated,
    Pending,
    Completed,
    Failed,
    Returned,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityState {
    Initiated,
    Pending,
    Received,
    Held,
    Available,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisbursementSource {
    Prefund,
    Direct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Disbursement {
    pub id: DisbursementId,
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub amount_cents: u64,
    pub status: TransferStatus,
    pub availability_state: AvailabilityState,
    pub provider_ref: Option<String>,
    pub rail: Option<Rail>,
    pub idempotency_key: Option<String>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub express_fee_cents: u32,
    pub net_amount_cents: u64,
    pub source: DisbursementSource,
    /// Id of the ledger journal posted on settlement, if any. Not part
    /// of the minimal data model but needed to locate the journal a
    /// later reversal must target.
    pub settlement_journal_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Repayment {
    pub id: RepaymentId,
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub amount_cents: u64,
    pub status: TransferStatus,
    pub availability_state: AvailabilityState,
    pub provider_ref: Option<String>,
    pub rail: Option<Rail>,
    pub idempotency_key: Option<String>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub applied_fee_cents: u64,
    pub applied_interest_cents: u64,
    pub applied_principal_cents: u64,
    /// Id of the ledger journal posted on settlement, if any. Carried so
    /// a `returned` webhook can reverse the exact journal this repayment
    /// settled against.
    pub settlement_journal_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractStatus {
    PendingDisbursement,
    Active,
    PaidOff,
    Defaulted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanContract {
    pub id: ContractId,
    pub tenant_id: TenantId,
    pub status: ContractStatus,
    pub principal_cents: u64,
    pub apr_bps: u32,
    pub term_months: u32,
    pub payment_frequency: bigfin_policy::PaymentFrequency,
    pub first_payment_date: NaiveDate,
    pub principal_balance_cents: i64,
    pub interest_balance_cents: i64,
    pub fees_balance_cents: i64,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub paid_off_at: Option<DateTime<Utc>>,
}

impl LoanContract {
    #[must_use]
    pub fn is_paid_off(&self) -> bool {
        self.principal_balance_cents == 0
            && self.interest_balance_cents == 0
            && self.fees_balance_cents == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefundTxnType {
    Deposit,
    Withdrawal,
    Fee,
    DisbursementHold,
    DisbursementRelease,
}

impl PrefundTxnType {
    /// Sign applied when folding a completed transaction into a running
    /// prefund balance, per §4.6's reconciliation fold rules.
    #[must_use]
    pub fn sign(self) -> i64 {
        match self {
            PrefundTxnType::Deposit | PrefundTxnType::DisbursementRelease => 1,
            PrefundTxnType::Withdrawal
            | PrefundTxnType::Fee
            | PrefundTxnType::DisbursementHold => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefundTxnStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefundTransaction {
    pub id: PrefundTxnId,
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub txn_type: PrefundTxnType,
    pub amount_cents: u64,
    pub status: PrefundTxnStatus,
    pub balance_after_cents: i64,
    pub available_after_cents: i64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait InstrumentStore: Send + Sync {
    async fn get(&self, tenant_id: &TenantId, id: &InstrumentId) -> PaymentsResult<FundingInstrument>;
    async fn put(&self, tenant_id: &TenantId, instrument: FundingInstrument) -> PaymentsResult<()>;
}

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn get(&self, tenant_id: &TenantId, id: &ContractId) -> PaymentsResult<LoanContract>;
    async fn update(&self, contract: LoanContract) -> PaymentsResult<()>;
    async fn list(&self, tenant_id: &TenantId) -> PaymentsResult<Vec<LoanContract>>;
}

#[async_trait]
pub trait DisbursementStore: Send + Sync {
    async fn insert(&self, disbursement: Disbursement) -> PaymentsResult<()>;
    async fn update(&self, disbursement: Disbursement) -> PaymentsResult<()>;
    async fn get(&self, tenant_id: &TenantId, id: &DisbursementId) -> PaymentsResult<Disbursement>;
    async fn get_by_provider_ref(
        &self,
        tenant_id: &TenantId,
        provider_ref: &str,
    ) -> PaymentsResult<Option<Disbursement>>;
    async fn list_in_window(
        &self,
        tenant_id: &TenantId,
        window: TimeWindow,
    ) -> PaymentsResult<Vec<Disbursement>>;
}

#[async_trait]
pub trait RepaymentStore: Send + Sync {
    async fn insert(&self, repayment: Repayment) -> PaymentsResult<()>;
    async fn update(&self, repayment: Repayment) -> PaymentsResult<()>;
    async fn get(&self, tenant_id: &TenantId, id: &RepaymentId) -> PaymentsResult<Repayment>;
    async fn get_by_provider_ref(
        &self,
        tenant_id: &TenantId,
        provider_ref: &str,
    ) -> PaymentsResult<Option<Repayment>>;
    async fn list_in_window(
        &self,
        tenant_id: &TenantId,
        window: TimeWindow,
    ) -> PaymentsResult<Vec<Repayment>>;
}

#[async_trait]
pub trait PrefundStore: Send + Sync {
    async fn append(&self, txn: PrefundTransaction) -> PaymentsResult<()>;
    async fn latest_completed(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
    ) -> PaymentsResult<Option<PrefundTransaction>>;
    async fn all_completed(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
    ) -> PaymentsResult<Vec<PrefundTransaction>>;
    async fn customers_with_activity(&self, tenant_id: &TenantId) -> PaymentsResult<Vec<CustomerId>>;
}
