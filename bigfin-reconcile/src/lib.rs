#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Reconciliation between BigFin's own records and the payment
//! provider's view of the world, plus an independent cross-check of the
//! ledger's own durable state. A run never mutates anything beyond the
//! narrow, idempotent auto-resolution path in §4.6 — detection is
//! read-mostly and per-record, not one big transaction.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use bigfin_audit::AuditEvent;
use bigfin_audit::AuditHook;
use bigfin_ledger::LedgerEngine;
use bigfin_payments::AvailabilityState;
use bigfin_payments::DisbursementStore;
use bigfin_payments::PaymentProvider;
use bigfin_payments::PrefundStore;
use bigfin_payments::ProviderStatus;
use bigfin_payments::ProviderTransferRecord;
use bigfin_payments::RepaymentStore;
use bigfin_payments::TenantId;
use bigfin_payments::TimeWindow;
use bigfin_payments::TransferStatus;
use bigfin_policy::ReconciliationPolicy;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use uuid::Uuid;

mod memory;

pub use memory::InMemoryReconciliationStore;

#[cfg(feature = "postgres-store")]
pub use memory::PostgresReconciliationStore;

pub type RunId = String;
pub type ExceptionId = String;
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("run {0} not found")]
    RunNotFound(RunId),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<bigfin_payments::PaymentsError> for ReconcileError {
    fn from(value: bigfin_payments::PaymentsError) -> Self {
        ReconcileError::Provider(value.to_string())
    }
}

impl From<bigfin_ledger::LedgerError> for ReconcileError {
    fn from(value: bigfin_ledger::LedgerError) -> Self {
        ReconcileError::Internal(format!("ledger: {value}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionType {
    TransferStatus,
    TransferMissing,
    TransferOrphaned,
    AmountMismatch,
    LedgerImbalance,
    PrefundMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionStatus {
    Open,
    Investigating,
    Resolved,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionType {
    AutoCorrected,
    ManuallyResolved,
    Ignored,
}

/// One detected discrepancy. `local_record_type`/`local_record_id` name
/// the BigFin-side record (`"disbursement"`, `"repayment"`, `"prefund"`,
/// `"ledger"`); `provider_record_id` is the provider's transfer id when
/// one exists. `local_value`/`provider_value` hold the two disagreeing
/// values as display strings — for a `prefund_mismatch` these are the
/// freshly folded total and the last recorded `available_after_cents`,
/// not literally provider data, since that check has no provider side.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationException {
    pub id: ExceptionId,
    pub tenant_id: TenantId,
    pub exception_type: ExceptionType,
    pub severity: Severity,
    pub status: ExceptionStatus,
    pub local_record_type: Option<String>,
    pub local_record_id: Option<String>,
    pub provider_record_id: Option<String>,
    pub local_value: Option<String>,
    pub provider_value: Option<String>,
    pub discrepancy_amount_cents: Option<i64>,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_type: Option<ResolutionType>,
}

#[allow(clippy::too_many_arguments)]
fn new_exception(
    tenant_id: &TenantId,
    exception_type: ExceptionType,
    severity: Severity,
    local_record_type: Option<&str>,
    local_record_id: Option<String>,
    provider_record_id: Option<String>,
    local_value: Option<String>,
    provider_value: Option<String>,
    discrepancy_amount_cents: Option<i64>,
    description: String,
) -> ReconciliationException {
    ReconciliationException {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.clone(),
        exception_type,
        severity,
        status: ExceptionStatus::Open,
        local_record_type: local_record_type.map(str::to_string),
        local_record_id,
        provider_record_id,
        local_value,
        provider_value,
        discrepancy_amount_cents,
        description,
        detected_at: Utc::now(),
        resolved_at: None,
        resolution_type: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationRun {
    pub id: RunId,
    pub tenant_id: TenantId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub dry_run: bool,
    pub status: RunStatus,
    pub exceptions: Vec<ReconciliationException>,
    pub auto_resolved_count: usize,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// `run()`'s input. An omitted `period_start`/`period_end` defaults to
/// the last 7 days ending now. `types`, when present, restricts the
/// returned exception set to those kinds (every sub-procedure still
/// runs; this is a result filter, not a procedure skip, so idempotency
/// and the trial-balance cross-check are unaffected by the filter).
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub tenant_id: TenantId,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub types: Option<Vec<ExceptionType>>,
    pub dry_run: bool,
}

pub trait ReconciliationStore: Send + Sync {
    fn save_run(&self, run: ReconciliationRun) -> ReconcileResult<()>;
    fn get_run(&self, tenant_id: &TenantId, run_id: &RunId) -> ReconcileResult<ReconciliationRun>;
    fn list_runs(&self, tenant_id: &TenantId) -> ReconcileResult<Vec<ReconciliationRun>>;
}

/// Normalized status bucket used to compare a local `TransferStatus`
/// against a provider `ProviderStatus` without the vocabularies having
/// to line up one-to-one. `Initiated` and `Processing` both collapse
/// into `Pending` here, since from a reconciliation standpoint neither
/// side has settled yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NormalizedStatus {
    Pending,
    Completed,
    Failed,
    Returned,
    Cancelled,
}

fn normalize_local_status(status: TransferStatus) -> NormalizedStatus {
    match status {
        TransferStatus::Initiated | TransferStatus::Pending => NormalizedStatus::Pending,
        TransferStatus::Completed => NormalizedStatus::Completed,
        TransferStatus::Failed => NormalizedStatus::Failed,
        TransferStatus::Returned => NormalizedStatus::Returned,
        TransferStatus::Cancelled => NormalizedStatus::Cancelled,
    }
}

fn normalize_provider_status(status: ProviderStatus) -> NormalizedStatus {
    match status {
        ProviderStatus::Pending | ProviderStatus::Processing => NormalizedStatus::Pending,
        ProviderStatus::Completed => NormalizedStatus::Completed,
        ProviderStatus::Failed => NormalizedStatus::Failed,
        ProviderStatus::Returned => NormalizedStatus::Returned,
        ProviderStatus::Canceled => NormalizedStatus::Cancelled,
    }
}

fn normalized_status_str(status: NormalizedStatus) -> &'static str {
    match status {
        NormalizedStatus::Pending => "pending",
        NormalizedStatus::Completed => "completed",
        NormalizedStatus::Failed => "failed",
        NormalizedStatus::Returned => "returned",
        NormalizedStatus::Cancelled => "cancelled",
    }
}

/// Fixed severity table keyed by which statuses disagree, independent
/// of amount. Only called when `local != provider`, so the diagonal is
/// never matched; the fallback arm exists only because `match` must be
/// exhaustive over the full cross product.
fn status_mismatch_severity(local: NormalizedStatus, provider: NormalizedStatus) -> Severity {
    use NormalizedStatus::{Cancelled, Completed, Failed, Pending, Returned};
    match (local, provider) {
        (Pending, Completed) | (Pending, Failed) | (Pending, Returned) => Severity::Medium,
        (Pending, Cancelled) => Severity::Low,
        (Completed, Failed) | (Completed, Returned) | (Completed, Cancelled) => {
            Severity::Critical
        }
        (Completed, Pending) => Severity::High,
        (Failed, Completed) | (Returned, Completed) | (Cancelled, Completed) => Severity::High,
        (Failed, Pending) | (Returned, Pending) | (Cancelled, Pending) => Severity::Medium,
        _ => Severity::Medium,
    }
}

/// Amount-based severity thresholds. `high`/`critical` are configurable
/// per tenant via `ReconciliationPolicy`; `low`/`medium`'s boundary is
/// fixed at 1000 cents, matching the spec's documented breakpoint.
fn severity_for_amount(discrepancy_cents: i64, policy: &ReconciliationPolicy) -> Severity {
    let magnitude = discrepancy_cents.abs();
    if magnitude >= policy.critical_severity_threshold_cents {
        Severity::Critical
    } else if magnitude >= policy.high_severity_threshold_cents {
        Severity::High
    } else if magnitude >= 1_000 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

struct LocalTransferView {
    record_type: &'static str,
    id: String,
    amount_cents: u64,
    status: TransferStatus,
    provider_ref: Option<String>,
    initiated_at: Option<DateTime<Utc>>,
}

/// Ties together the stores, the provider port, the ledger, and the
/// audit hook so a run can compare BigFin's records against the
/// provider's and flag every disagreement as a
/// [`ReconciliationException`].
pub struct ReconciliationEngine {
    provider: Arc<dyn PaymentProvider>,
    disbursements: Arc<dyn DisbursementStore>,
    repayments: Arc<dyn RepaymentStore>,
    prefund: Arc<dyn PrefundStore>,
    ledger: Arc<dyn LedgerEngine>,
    store: Arc<dyn ReconciliationStore>,
    audit: Arc<dyn AuditHook>,
}

impl ReconciliationEngine {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        disbursements: Arc<dyn DisbursementStore>,
        repayments: Arc<dyn RepaymentStore>,
        prefund: Arc<dyn PrefundStore>,
        ledger: Arc<dyn LedgerEngine>,
        store: Arc<dyn ReconciliationStore>,
        audit: Arc<dyn AuditHook>,
    ) -> Self {
        Self {
            provider,
            disbursements,
            repayments,
            prefund,
            ledger,
            store,
            audit,
        }
    }

    pub async fn run(
        &self,
        request: RunRequest,
        policy: &ReconciliationPolicy,
    ) -> ReconcileResult<ReconciliationRun> {
        let started_at = Utc::now();
        let period_end = request.period_end.unwrap_or(started_at);
        let period_start = request
            .period_start
            .unwrap_or_else(|| period_end - Duration::days(7));
        let window = TimeWindow {
            start: period_start,
            end: period_end,
        };

        match self.detect(&request.tenant_id, window, policy).await {
            Ok(mut exceptions) => {
                if let Some(types) = &request.types {
                    exceptions.retain(|exception| types.contains(&exception.exception_type));
                }

                let mut auto_resolved_count = 0;
                if !request.dry_run && policy.auto_resolve_enabled {
                    for exception in &mut exceptions {
                        if self
                            .try_auto_resolve(&request.tenant_id, exception, policy)
                            .await?
                        {
                            auto_resolved_count += 1;
                        }
                    }
                }

                for exception in &exceptions {
                    self.audit
                        .notify(
                            AuditEvent::new(
                                request.tenant_id.clone(),
                                "reconciliation_exception",
                                exception.id.clone(),
                                if exception.status == ExceptionStatus::Resolved {
                                    "auto_resolved"
                                } else {
                                    "detected"
                                },
                                "reconciliation-engine",
                            )
                            .with_metadata(serde_json::json!({
                                "exception_type": format!("{:?}", exception.exception_type),
                                "severity": format!("{:?}", exception.severity),
                            })),
                        )
                        .await
                        .map_err(|err| ReconcileError::Internal(err.to_string()))?;
                }

                let run = ReconciliationRun {
                    id: Uuid::new_v4().to_string(),
                    tenant_id: request.tenant_id,
                    period_start,
                    period_end,
                    dry_run: request.dry_run,
                    status: RunStatus::Completed,
                    exceptions,
                    auto_resolved_count,
                    error_message: None,
                    started_at,
                    finished_at: Utc::now(),
                };
                self.store.save_run(run.clone())?;
                Ok(run)
            }
            Err(err) => {
                let run = ReconciliationRun {
                    id: Uuid::new_v4().to_string(),
                    tenant_id: request.tenant_id,
                    period_start,
                    period_end,
                    dry_run: request.dry_run,
                    status: RunStatus::Failed,
                    exceptions: Vec::new(),
                    auto_resolved_count: 0,
                    error_message: Some(err.to_string()),
                    started_at,
                    finished_at: Utc::now(),
                };
                self.store.save_run(run.clone())?;
                tracing::warn!(tenant_id = %run.tenant_id, error = %err, "reconciliation run failed");
                Err(err)
            }
        }
    }

    async fn detect(
        &self,
        tenant_id: &TenantId,
        window: TimeWindow,
        policy: &ReconciliationPolicy,
    ) -> ReconcileResult<Vec<ReconciliationException>> {
        let mut exceptions = Vec::new();

        let provider_records = self.provider.list_transfers(window).await?;
        let provider_by_id: HashMap<&str, &ProviderTransferRecord> = provider_records
            .iter()
            .map(|record| (record.id.as_str(), record))
            .collect();
        let mut matched: HashSet<String> = HashSet::new();

        let disbursements = self.disbursements.list_in_window(tenant_id, window).await?;
        let mut local_views: Vec<LocalTransferView> = disbursements
            .into_iter()
            .map(|disbursement| LocalTransferView {
                record_type: "disbursement",
                id: disbursement.id,
                amount_cents: disbursement.amount_cents,
                status: disbursement.status,
                provider_ref: disbursement.provider_ref,
                initiated_at: disbursement.initiated_at,
            })
            .collect();

        let repayments = self.repayments.list_in_window(tenant_id, window).await?;
        local_views.extend(repayments.into_iter().map(|repayment| LocalTransferView {
            record_type: "repayment",
            id: repayment.id,
            amount_cents: repayment.amount_cents,
            status: repayment.status,
            provider_ref: repayment.provider_ref,
            initiated_at: repayment.initiated_at,
        }));

        for view in &local_views {
            let Some(provider_ref) = &view.provider_ref else {
                continue;
            };
            match provider_by_id.get(provider_ref.as_str()) {
                None => {
                    let orphaned_long_enough = view
                        .initiated_at
                        .is_some_and(|initiated_at| Utc::now() - initiated_at > Duration::hours(24));
                    if orphaned_long_enough {
                        exceptions.push(new_exception(
                            tenant_id,
                            ExceptionType::TransferOrphaned,
                            Severity::High,
                            Some(view.record_type),
                            Some(view.id.clone()),
                            Some(provider_ref.clone()),
                            None,
                            None,
                            None,
                            format!(
                                "{} {} references provider transfer {provider_ref}, which the provider has no record of",
                                view.record_type, view.id
                            ),
                        ));
                    }
                }
                Some(provider_record) => {
                    matched.insert(provider_ref.clone());
                    if view.amount_cents != provider_record.amount_cents {
                        let discrepancy =
                            view.amount_cents as i64 - provider_record.amount_cents as i64;
                        exceptions.push(new_exception(
                            tenant_id,
                            ExceptionType::AmountMismatch,
                            severity_for_amount(discrepancy, policy),
                            Some(view.record_type),
                            Some(view.id.clone()),
                            Some(provider_ref.clone()),
                            Some(view.amount_cents.to_string()),
                            Some(provider_record.amount_cents.to_string()),
                            Some(discrepancy),
                            format!(
                                "{} {} amount {} cents disagrees with provider amount {} cents",
                                view.record_type,
                                view.id,
                                view.amount_cents,
                                provider_record.amount_cents
                            ),
                        ));
                        continue;
                    }

                    let local_norm = normalize_local_status(view.status);
                    let provider_norm = normalize_provider_status(provider_record.status);
                    if local_norm != provider_norm {
                        exceptions.push(new_exception(
                            tenant_id,
                            ExceptionType::TransferStatus,
                            status_mismatch_severity(local_norm, provider_norm),
                            Some(view.record_type),
                            Some(view.id.clone()),
                            Some(provider_ref.clone()),
                            Some(normalized_status_str(local_norm).to_string()),
                            Some(normalized_status_str(provider_norm).to_string()),
                            Some(0),
                            format!(
                                "{} {} status {} disagrees with provider status {}",
                                view.record_type,
                                view.id,
                                normalized_status_str(local_norm),
                                normalized_status_str(provider_norm)
                            ),
                        ));
                    }
                }
            }
        }

        for record in &provider_records {
            if matched.contains(&record.id) {
                continue;
            }
            exceptions.push(new_exception(
                tenant_id,
                ExceptionType::TransferMissing,
                Severity::Medium,
                None,
                None,
                Some(record.id.clone()),
                None,
                Some(normalized_status_str(normalize_provider_status(record.status)).to_string()),
                None,
                format!(
                    "provider transfer {} has no matching local disbursement or repayment",
                    record.id
                ),
            ));
        }

        let accounts = self.ledger.list_accounts(tenant_id).await?;
        let trial_balance = self.ledger.get_trial_balance(tenant_id).await?;
        if !trial_balance.is_balanced(&accounts) {
            exceptions.push(new_exception(
                tenant_id,
                ExceptionType::LedgerImbalance,
                Severity::Critical,
                Some("ledger"),
                None,
                None,
                None,
                None,
                None,
                "trial balance does not net to zero across the chart of accounts".to_string(),
            ));
        }

        for customer_id in self.prefund.customers_with_activity(tenant_id).await? {
            let mut completed = self.prefund.all_completed(tenant_id, &customer_id).await?;
            if completed.is_empty() {
                continue;
            }
            completed.sort_by_key(|txn| txn.created_at);

            let folded_total: i64 = completed
                .iter()
                .map(|txn| txn.amount_cents as i64 * txn.txn_type.sign())
                .sum();
            let recorded = completed
                .last()
                .map_or(0, |txn| txn.available_after_cents);

            if folded_total != recorded {
                let discrepancy = folded_total - recorded;
                exceptions.push(new_exception(
                    tenant_id,
                    ExceptionType::PrefundMismatch,
                    severity_for_amount(discrepancy, policy),
                    Some("prefund"),
                    Some(customer_id.clone()),
                    None,
                    Some(folded_total.to_string()),
                    Some(recorded.to_string()),
                    Some(discrepancy),
                    format!(
                        "prefund fold for customer {customer_id} totals {folded_total} cents but the last recorded available balance is {recorded} cents"
                    ),
                ));
            }
        }

        Ok(exceptions)
    }

    /// Auto-resolution per §4.6: only `transfer_status` exceptions,
    /// only within `auto_resolve_threshold_cents`, only local `pending`
    /// vs. provider `completed`. A record already `Completed` is a
    /// no-op, which is what makes re-running reconciliation over the
    /// same window safe.
    async fn try_auto_resolve(
        &self,
        tenant_id: &TenantId,
        exception: &mut ReconciliationException,
        policy: &ReconciliationPolicy,
    ) -> ReconcileResult<bool> {
        if exception.exception_type != ExceptionType::TransferStatus {
            return Ok(false);
        }
        if exception.local_value.as_deref() != Some("pending")
            || exception.provider_value.as_deref() != Some("completed")
        {
            return Ok(false);
        }
        let discrepancy = exception.discrepancy_amount_cents.unwrap_or(0).abs();
        if discrepancy > policy.auto_resolve_threshold_cents {
            return Ok(false);
        }
        let (Some(record_type), Some(record_id)) = (
            exception.local_record_type.as_deref(),
            exception.local_record_id.clone(),
        ) else {
            return Ok(false);
        };

        let resolved = match record_type {
            "disbursement" => {
                let mut disbursement = self.disbursements.get(tenant_id, &record_id).await?;
                if disbursement.status == TransferStatus::Completed {
                    return Ok(false);
                }
                disbursement.status = TransferStatus::Completed;
                disbursement.availability_state = AvailabilityState::Available;
                disbursement.completed_at = Some(Utc::now());
                self.disbursements.update(disbursement).await?;
                true
            }
            "repayment" => {
                let mut repayment = self.repayments.get(tenant_id, &record_id).await?;
                if repayment.status == TransferStatus::Completed {
                    return Ok(false);
                }
                repayment.status = TransferStatus::Completed;
                repayment.availability_state = AvailabilityState::Available;
                repayment.completed_at = Some(Utc::now());
                self.repayments.update(repayment).await?;
                true
            }
            _ => false,
        };

        if resolved {
            exception.status = ExceptionStatus::Resolved;
            exception.resolution_type = Some(ResolutionType::AutoCorrected);
            exception.resolved_at = Some(Utc::now());
        }
        Ok(resolved)
    }
}
