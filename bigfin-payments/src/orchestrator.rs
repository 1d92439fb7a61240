use std::sync::Arc;

use bigfin_audit::AuditEvent;
use bigfin_audit::AuditHook;
use bigfin_ledger::AccountCode;
use bigfin_ledger::CreateJournalRequest;
use bigfin_ledger::JournalType;
use bigfin_ledger::LedgerEngine;
use bigfin_ledger::NewEntryLine;
use bigfin_policy::ProductPolicy;
use bigfin_routing::Rail;
use bigfin_routing::RoutingSpeed;
use bigfin_tenancy::IdempotencyRecord;
use bigfin_tenancy::IdempotencyStore;
use chrono::DateTime;
use chrono::FixedOffset;
use chrono::Utc;
use uuid::Uuid;

use crate::ContractId;
use crate::ContractStatus;
use crate::ContractStore;
use crate::Disbursement;
use crate::DisbursementSource;
use crate::DisbursementStore;
use crate::InstrumentId;
use crate::InstrumentStore;
use crate::PaymentProvider;
use crate::PaymentsError;
use crate::PaymentsResult;
use crate::PrefundStore;
use crate::Repayment;
use crate::RepaymentStore;
use crate::TenantId;
use crate::TransferStatus;
use crate::accounts;
use crate::provider::CreateTransferRequest;
use crate::provider::ProviderPaymentMethod;
use crate::provider::ProviderStatus;
use crate::waterfall::apply_waterfall;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Disbursement,
    Repayment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Credit,
    Debit,
}

impl TransferKind {
    #[must_use]
    pub fn direction(self) -> TransferDirection {
        match self {
            TransferKind::Disbursement => TransferDirection::Credit,
            TransferKind::Repayment => TransferDirection::Debit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitiateTransferInput {
    pub contract_id: ContractId,
    pub kind: TransferKind,
    pub amount_cents: u64,
    pub speed: RoutingSpeed,
    pub customer_instrument_id: InstrumentId,
    pub customer_account_ref: String,
    pub platform_account_ref: String,
    pub idempotency_key: Option<String>,
    pub disbursement_source: Option<DisbursementSource>,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub record_id: String,
    pub kind: TransferKind,
    pub provider_ref: String,
    pub rail: Rail,
    pub status: TransferStatus,
    pub fee_cents: u32,
    pub estimated_arrival: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub tenant_id: TenantId,
    pub provider_ref: String,
    pub provider_status: ProviderStatus,
    pub occurred_at: DateTime<Utc>,
}

fn destination_pm_kind(rail: Rail) -> &'static str {
    match rail {
        Rail::Rtp => "rtp-credit",
        Rail::Fednow => "fednow-credit",
        Rail::PushToCard => "push-to-card",
        Rail::SameDayAch => "ach-credit-same-day",
        Rail::Ach => "ach-credit-standard",
    }
}

fn source_pm_kinds(rail: Rail) -> Option<[&'static str; 2]> {
    match rail {
        Rail::SameDayAch | Rail::Ach => Some(["ach-debit-fund", "ach-debit-collect"]),
        _ => None,
    }
}

fn find_pm<'a>(methods: &'a [ProviderPaymentMethod], kinds: &[&str]) -> Option<&'a ProviderPaymentMethod> {
    methods.iter().find(|method| kinds.contains(&method.kind.as_str()))
}

fn map_disbursement_status(status: ProviderStatus) -> (TransferStatus, crate::AvailabilityState) {
    use crate::AvailabilityState as A;
    match status {
        ProviderStatus::Pending | ProviderStatus::Processing => (TransferStatus::Pending, A::Pending),
        ProviderStatus::Completed => (TransferStatus::Completed, A::Available),
        ProviderStatus::Failed | ProviderStatus::Returned | ProviderStatus::Canceled => {
            (TransferStatus::Failed, A::Failed)
        }
    }
}

fn map_repayment_status(status: ProviderStatus) -> (TransferStatus, crate::AvailabilityState) {
    use crate::AvailabilityState as A;
    match status {
        ProviderStatus::Pending | ProviderStatus::Processing => (TransferStatus::Pending, A::Pending),
        ProviderStatus::Completed => (TransferStatus::Completed, A::Available),
        ProviderStatus::Failed => (TransferStatus::Failed, A::Failed),
        ProviderStatus::Returned => (TransferStatus::Returned, A::Failed),
        ProviderStatus::Canceled => (TransferStatus::Cancelled, A::Failed),
    }
}

/// Idempotently initiates transfers through a `PaymentProvider`,
/// iterating the routing engine's fallback chain on provider failure,
/// and ingests provider status updates, applying their ledger and
/// contract-lifecycle effects.
pub struct TransferOrchestrator {
    provider: Arc<dyn PaymentProvider>,
    instruments: Arc<dyn InstrumentStore>,
    disbursements: Arc<dyn DisbursementStore>,
    repayments: Arc<dyn RepaymentStore>,
    contracts: Arc<dyn ContractStore>,
    prefund: Arc<dyn PrefundStore>,
    ledger: Arc<dyn LedgerEngine>,
    idempotency: Arc<dyn IdempotencyStore>,
    audit: Arc<dyn AuditHook>,
}

impl TransferOrchestrator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        instruments: Arc<dyn InstrumentStore>,
        disbursements: Arc<dyn DisbursementStore>,
        repayments: Arc<dyn RepaymentStore>,
        contracts: Arc<dyn ContractStore>,
        prefund: Arc<dyn PrefundStore>,
        ledger: Arc<dyn LedgerEngine>,
        idempotency: Arc<dyn IdempotencyStore>,
        audit: Arc<dyn AuditHook>,
    ) -> Self {
        Self {
            provider,
            instruments,
            disbursements,
            repayments,
            contracts,
            prefund,
            ledger,
            idempotency,
            audit,
        }
    }

    pub async fn initiate(
        &self,
        tenant_id: &TenantId,
        policy: &ProductPolicy,
        input: InitiateTransferInput,
    ) -> PaymentsResult<TransferResult> {
        if let Some(key) = &input.idempotency_key {
            if let Some(cached) = self.idempotency.get(tenant_id, key).await? {
                return parse_cached_result(&cached.response);
            }
        }

        let instrument = self
            .instruments
            .get(tenant_id, &input.customer_instrument_id)
            .await?;
        let available = instrument.available_rails();
        let plan = bigfin_routing::route(&available, input.speed)
            .map_err(|_| PaymentsError::InstrumentInvalid("no rail available for instrument".into()))?;

        let fee_cents = match (input.kind, input.speed) {
            (TransferKind::Disbursement, RoutingSpeed::Instant) => {
                let base = express_fee_for(&policy.fees_policy, input.amount_cents);
                self.apply_prefund_waiver(tenant_id, &instrument.customer_id, input.amount_cents, base)
                    .await?
            }
            _ => 0,
        };

        let local_now = Utc::now().with_timezone(&business_hours_offset(
            policy.availability_policy.business_hours_utc_offset_minutes,
        ));

        let mut attempted = Vec::new();
        for rail in plan.attempt_order() {
            match self.attempt_rail(tenant_id, &input, rail).await {
                Ok(transfer) => {
                    let estimated_arrival = bigfin_routing::estimated_arrival(rail, local_now).with_timezone(&Utc);
                    let result = self
                        .settle_initiation(
                            tenant_id,
                            policy,
                            &input,
                            rail,
                            fee_cents,
                            transfer.provider_id,
                            estimated_arrival,
                        )
                        .await?;

                    if let Some(key) = input.idempotency_key {
                        self.idempotency
                            .put(IdempotencyRecord::new(
                                tenant_id.clone(),
                                key,
                                serialize_result(&result),
                                201,
                            ))
                            .await?;
                    }
                    return Ok(result);
                }
                Err(err) => attempted.push(format!("{rail:?}: {err}")),
            }
        }

        Err(PaymentsError::ProviderError {
            attempted_rails: attempted.join(", "),
            message: "every rail in the fallback chain failed".into(),
        })
    }

    async fn apply_prefund_waiver(
        &self,
        tenant_id: &TenantId,
        customer_id: &str,
        amount_cents: u64,
        base_fee_cents: u32,
    ) -> PaymentsResult<u32> {
        let latest = self
            .prefund
            .latest_completed(tenant_id, &customer_id.to_string())
            .await?;
        Ok(match latest {
            Some(txn) => {
                bigfin_routing::apply_prefund_waiver(base_fee_cents, txn.available_after_cents, amount_cents)
            }
            None => base_fee_cents,
        })
    }

    async fn attempt_rail(
        &self,
        tenant_id: &TenantId,
        input: &InitiateTransferInput,
        rail: Rail,
    ) -> PaymentsResult<crate::provider::ProviderTransfer> {
        let customer_methods = self
            .provider
            .list_payment_methods(&input.customer_account_ref)
            .await?;
        let platform_methods = self
            .provider
            .list_payment_methods(&input.platform_account_ref)
            .await?;

        let (source_id, dest_id) = match input.kind.direction() {
            TransferDirection::Credit => {
                let dest = find_pm(&customer_methods, &[destination_pm_kind(rail)]);
                let source = source_pm_kinds(rail).and_then(|kinds| find_pm(&platform_methods, &kinds));
                (source, dest)
            }
            TransferDirection::Debit => {
                let source = source_pm_kinds(rail).and_then(|kinds| find_pm(&customer_methods, &kinds));
                let dest = find_pm(&platform_methods, &[destination_pm_kind(rail)]);
                (source, dest)
            }
        };

        let Some(dest_id) = dest_id else {
            return Err(PaymentsError::InstrumentInvalid(format!(
                "no destination payment method for rail {rail:?}"
            )));
        };
        if source_pm_kinds(rail).is_some() && source_id.is_none() {
            return Err(PaymentsError::InstrumentInvalid(format!(
                "no source payment method for rail {rail:?}"
            )));
        }

        let metadata = crate::provider::tenant_scoped_metadata(
            tenant_id,
            match input.kind {
                TransferKind::Disbursement => "disbursement",
                TransferKind::Repayment => "repayment",
            },
        );

        self.provider
            .create_transfer(CreateTransferRequest {
                source_payment_method_id: source_id.map(|pm| pm.id.clone()),
                destination_payment_method_id: dest_id.id.clone(),
                amount_cents: input.amount_cents,
                description: format!("{:?} for contract {}", input.kind, input.contract_id),
                metadata,
                idempotency_key: input.idempotency_key.as_ref().map(|key| format!("{key}-transfer")),
            })
            .await
    }

    async fn settle_initiation(
        &self,
        tenant_id: &TenantId,
        policy: &ProductPolicy,
        input: &InitiateTransferInput,
        rail: Rail,
        fee_cents: u32,
        provider_ref: String,
        estimated_arrival: DateTime<Utc>,
    ) -> PaymentsResult<TransferResult> {
        let record_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        match input.kind {
            TransferKind::Disbursement => {
                let net_amount_cents = input.amount_cents.saturating_sub(u64::from(fee_cents));
                let disbursement = Disbursement {
                    id: record_id.clone(),
                    tenant_id: tenant_id.clone(),
                    contract_id: input.contract_id.clone(),
                    amount_cents: input.amount_cents,
                    status: TransferStatus::Initiated,
                    availability_state: crate::AvailabilityState::Initiated,
                    provider_ref: Some(provider_ref.clone()),
                    rail: Some(rail),
                    idempotency_key: input.idempotency_key.clone(),
                    initiated_at: Some(now),
                    completed_at: None,
                    failed_at: None,
                    failure_reason: None,
                    express_fee_cents: fee_cents,
                    net_amount_cents,
                    source: input.disbursement_source.unwrap_or(DisbursementSource::Direct),
                    settlement_journal_id: None,
                };
                self.disbursements.insert(disbursement).await?;
            }
            TransferKind::Repayment => {
                let contract = self.contracts.get(tenant_id, &input.contract_id).await?;
                let split = apply_waterfall(
                    &policy.waterfall_policy,
                    input.amount_cents,
                    contract.fees_balance_cents.max(0) as u64,
                    contract.interest_balance_cents.max(0) as u64,
                    contract.principal_balance_cents.max(0) as u64,
                )?;
                let repayment = Repayment {
                    id: record_id.clone(),
                    tenant_id: tenant_id.clone(),
                    contract_id: input.contract_id.clone(),
                    amount_cents: input.amount_cents,
                    status: TransferStatus::Initiated,
                    availability_state: crate::AvailabilityState::Initiated,
                    provider_ref: Some(provider_ref.clone()),
                    rail: Some(rail),
                    idempotency_key: input.idempotency_key.clone(),
                    initiated_at: Some(now),
                    completed_at: None,
                    failed_at: None,
                    failure_reason: None,
                    applied_fee_cents: split.applied_fee_cents,
                    applied_interest_cents: split.applied_interest_cents,
                    applied_principal_cents: split.applied_principal_cents,
                    settlement_journal_id: None,
                };
                self.repayments.insert(repayment).await?;
            }
        }

        self.audit
            .notify(AuditEvent::new(
                tenant_id.clone(),
                match input.kind {
                    TransferKind::Disbursement => "disbursement",
                    TransferKind::Repayment => "repayment",
                },
                record_id.clone(),
                "initiated",
                input.actor.clone(),
            ))
            .await
            .map_err(|err| PaymentsError::Internal(err.to_string()))?;

        Ok(TransferResult {
            record_id,
            kind: input.kind,
            provider_ref,
            rail,
            status: TransferStatus::Initiated,
            fee_cents,
            estimated_arrival,
        })
    }

    /// Looks up a disbursement or repayment by provider reference and
    /// returns its current state as a `TransferResult`, or `None` if no
    /// transfer with that reference exists for the tenant.
    pub async fn get(
        &self,
        tenant_id: &TenantId,
        provider_ref: &str,
    ) -> PaymentsResult<Option<TransferResult>> {
        if let Some(disbursement) = self
            .disbursements
            .get_by_provider_ref(tenant_id, provider_ref)
            .await?
        {
            return Ok(Some(transfer_result_from_disbursement(&disbursement)));
        }
        if let Some(repayment) = self
            .repayments
            .get_by_provider_ref(tenant_id, provider_ref)
            .await?
        {
            return Ok(Some(transfer_result_from_repayment(&repayment)));
        }
        Ok(None)
    }

    /// Cancels an in-flight transfer at the provider and marks the local
    /// record `Cancelled`. Rejects a transfer that already settled or was
    /// already cancelled.
    pub async fn cancel(&self, tenant_id: &TenantId, provider_ref: &str) -> PaymentsResult<()> {
        if let Some(mut disbursement) = self
            .disbursements
            .get_by_provider_ref(tenant_id, provider_ref)
            .await?
        {
            if matches!(
                disbursement.status,
                TransferStatus::Completed | TransferStatus::Cancelled
            ) {
                return Err(PaymentsError::InvalidState(format!(
                    "disbursement {} cannot be cancelled from {:?}",
                    disbursement.id, disbursement.status
                )));
            }
            self.provider.cancel(provider_ref).await?;
            disbursement.status = TransferStatus::Cancelled;
            disbursement.availability_state = crate::AvailabilityState::Failed;
            disbursement.failed_at = Some(Utc::now());
            disbursement.failure_reason = Some("cancelled".into());
            let record_id = disbursement.id.clone();
            self.disbursements.update(disbursement).await?;
            self.audit
                .notify(AuditEvent::new(
                    tenant_id.clone(),
                    "disbursement",
                    record_id,
                    "cancelled",
                    "operator",
                ))
                .await
                .map_err(|err| PaymentsError::Internal(err.to_string()))?;
            return Ok(());
        }

        if let Some(mut repayment) = self
            .repayments
            .get_by_provider_ref(tenant_id, provider_ref)
            .await?
        {
            if matches!(
                repayment.status,
                TransferStatus::Completed | TransferStatus::Cancelled
            ) {
                return Err(PaymentsError::InvalidState(format!(
                    "repayment {} cannot be cancelled from {:?}",
                    repayment.id, repayment.status
                )));
            }
            self.provider.cancel(provider_ref).await?;
            repayment.status = TransferStatus::Cancelled;
            repayment.availability_state = crate::AvailabilityState::Failed;
            repayment.failed_at = Some(Utc::now());
            repayment.failure_reason = Some("cancelled".into());
            let record_id = repayment.id.clone();
            self.repayments.update(repayment).await?;
            self.audit
                .notify(AuditEvent::new(
                    tenant_id.clone(),
                    "repayment",
                    record_id,
                    "cancelled",
                    "operator",
                ))
                .await
                .map_err(|err| PaymentsError::Internal(err.to_string()))?;
            return Ok(());
        }

        Err(PaymentsError::NotFound(format!(
            "no transfer with provider reference {provider_ref}"
        )))
    }

    /// Looks up a disbursement or repayment by provider reference and
    /// applies the status transition, ledger posting, and contract
    /// lifecycle effects the new status implies.
    pub async fn process_status_update(&self, update: StatusUpdate) -> PaymentsResult<()> {
        if let Some(disbursement) = self
            .disbursements
            .get_by_provider_ref(&update.tenant_id, &update.provider_ref)
            .await?
        {
            return self.apply_disbursement_update(disbursement, update).await;
        }
        if let Some(repayment) = self
            .repayments
            .get_by_provider_ref(&update.tenant_id, &update.provider_ref)
            .await?
        {
            return self.apply_repayment_update(repayment, update).await;
        }
        tracing::warn!(provider_ref = %update.provider_ref, "status update for unknown transfer");
        Ok(())
    }

    async fn apply_disbursement_update(
        &self,
        mut disbursement: Disbursement,
        update: StatusUpdate,
    ) -> PaymentsResult<()> {
        if disbursement.status == TransferStatus::Completed {
            return Ok(());
        }

        let (status, availability) = map_disbursement_status(update.provider_status);
        disbursement.status = status;
        disbursement.availability_state = availability;

        match status {
            TransferStatus::Completed => {
                disbursement.completed_at = Some(update.occurred_at);
                let mut contract = self
                    .contracts
                    .get(&update.tenant_id, &disbursement.contract_id)
                    .await?;
                if contract.status == ContractStatus::PendingDisbursement {
                    contract.status = ContractStatus::Active;
                    contract.disbursed_at = Some(update.occurred_at);
                    self.contracts.update(contract).await?;
                }

                let journal = self
                    .post_disbursement_journal(&update.tenant_id, &disbursement)
                    .await?;
                disbursement.settlement_journal_id = Some(journal.id);
            }
            TransferStatus::Failed => {
                disbursement.failed_at = Some(update.occurred_at);
                disbursement.failure_reason = Some(format!("{:?}", update.provider_status));
            }
            _ => {}
        }

        self.disbursements.update(disbursement.clone()).await?;
        self.audit
            .notify(AuditEvent::new(
                update.tenant_id,
                "disbursement",
                disbursement.id,
                format!("status:{status:?}"),
                "provider-webhook",
            ))
            .await
            .map_err(|err| PaymentsError::Internal(err.to_string()))?;
        Ok(())
    }

    async fn apply_repayment_update(
        &self,
        mut repayment: Repayment,
        update: StatusUpdate,
    ) -> PaymentsResult<()> {
        if repayment.status == TransferStatus::Completed {
            return Ok(());
        }

        let (status, availability) = map_repayment_status(update.provider_status);
        repayment.status = status;
        repayment.availability_state = availability;

        match status {
            TransferStatus::Completed => {
                repayment.completed_at = Some(update.occurred_at);
                let journal = self.post_repayment_journal(&update.tenant_id, &repayment).await?;
                repayment.settlement_journal_id = Some(journal.id.clone());
                self.apply_repayment_to_contract(&update.tenant_id, &repayment).await?;
            }
            TransferStatus::Returned => {
                repayment.failed_at = Some(update.occurred_at);
                repayment.failure_reason = Some("returned".into());
                if let Some(journal_id) = repayment.settlement_journal_id.clone() {
                    self.ledger
                        .reverse_journal(
                            &update.tenant_id,
                            &journal_id,
                            "repayment returned".into(),
                            "provider-webhook".into(),
                        )
                        .await?;
                }
            }
            TransferStatus::Failed | TransferStatus::Cancelled => {
                repayment.failed_at = Some(update.occurred_at);
                repayment.failure_reason = Some(format!("{:?}", update.provider_status));
            }
            _ => {}
        }

        self.repayments.update(repayment.clone()).await?;
        self.audit
            .notify(AuditEvent::new(
                update.tenant_id,
                "repayment",
                repayment.id,
                format!("status:{status:?}"),
                "provider-webhook",
            ))
            .await
            .map_err(|err| PaymentsError::Internal(err.to_string()))?;
        Ok(())
    }

    async fn apply_repayment_to_contract(
        &self,
        tenant_id: &TenantId,
        repayment: &Repayment,
    ) -> PaymentsResult<()> {
        let mut contract = self.contracts.get(tenant_id, &repayment.contract_id).await?;
        contract.fees_balance_cents -= repayment.applied_fee_cents as i64;
        contract.interest_balance_cents -= repayment.applied_interest_cents as i64;
        contract.principal_balance_cents -= repayment.applied_principal_cents as i64;
        if contract.is_paid_off() && contract.status == ContractStatus::Active {
            contract.status = ContractStatus::PaidOff;
            contract.paid_off_at = Some(Utc::now());
        }
        self.contracts.update(contract).await
    }

    async fn post_disbursement_journal(
        &self,
        tenant_id: &TenantId,
        disbursement: &Disbursement,
    ) -> PaymentsResult<bigfin_ledger::Journal> {
        let funding_account: AccountCode = match disbursement.source {
            DisbursementSource::Prefund => accounts::PREFUND_BALANCES.to_string(),
            DisbursementSource::Direct => accounts::CASH_OPERATING.to_string(),
        };

        let mut lines = vec![
            NewEntryLine {
                account_code: accounts::LOANS_PRINCIPAL.to_string(),
                debit_cents: disbursement.amount_cents,
                credit_cents: 0,
            },
            NewEntryLine {
                account_code: funding_account,
                debit_cents: 0,
                credit_cents: disbursement.amount_cents,
            },
        ];
        if disbursement.express_fee_cents > 0 {
            lines.push(NewEntryLine {
                account_code: accounts::CASH_OPERATING.to_string(),
                debit_cents: u64::from(disbursement.express_fee_cents),
                credit_cents: 0,
            });
            lines.push(NewEntryLine {
                account_code: accounts::REVENUE_FEES_EXPRESS.to_string(),
                debit_cents: 0,
                credit_cents: u64::from(disbursement.express_fee_cents),
            });
        }

        let journal = self
            .ledger
            .create_journal(CreateJournalRequest {
                tenant_id: tenant_id.clone(),
                contract_id: Some(disbursement.contract_id.clone()),
                journal_type: JournalType::Disbursement,
                description: format!("Disbursement {}", disbursement.id),
                created_by: "transfer-orchestrator".into(),
                lines,
            })
            .await?;
        Ok(journal)
    }

    async fn post_repayment_journal(
        &self,
        tenant_id: &TenantId,
        repayment: &Repayment,
    ) -> PaymentsResult<bigfin_ledger::Journal> {
        let mut lines = vec![NewEntryLine {
            account_code: accounts::CASH_OPERATING.to_string(),
            debit_cents: repayment.amount_cents,
            credit_cents: 0,
        }];
        if repayment.applied_fee_cents > 0 {
            lines.push(NewEntryLine {
                account_code: accounts::LOANS_FEES.to_string(),
                debit_cents: 0,
                credit_cents: repayment.applied_fee_cents,
            });
        }
        if repayment.applied_interest_cents > 0 {
            lines.push(NewEntryLine {
                account_code: accounts::LOANS_INTEREST.to_string(),
                debit_cents: 0,
                credit_cents: repayment.applied_interest_cents,
            });
        }
        if repayment.applied_principal_cents > 0 {
            lines.push(NewEntryLine {
                account_code: accounts::LOANS_PRINCIPAL.to_string(),
                debit_cents: 0,
                credit_cents: repayment.applied_principal_cents,
            });
        }

        let journal = self
            .ledger
            .create_journal(CreateJournalRequest {
                tenant_id: tenant_id.clone(),
                contract_id: Some(repayment.contract_id.clone()),
                journal_type: JournalType::Repayment,
                description: format!("Repayment {}", repayment.id),
                created_by: "transfer-orchestrator".into(),
                lines,
            })
            .await?;
        Ok(journal)
    }
}

/// Rebuilds a `TransferResult` view over a stored `Disbursement`. The
/// estimated arrival isn't persisted on the record, so it's recomputed
/// from the rail and the original initiation time against a UTC offset;
/// this is an approximation for records initiated under a tenant's own
/// business-hours offset, but matches the routing engine's ETA model.
fn transfer_result_from_disbursement(disbursement: &Disbursement) -> TransferResult {
    TransferResult {
        record_id: disbursement.id.clone(),
        kind: TransferKind::Disbursement,
        provider_ref: disbursement.provider_ref.clone().unwrap_or_default(),
        rail: disbursement.rail.unwrap_or(Rail::Ach),
        status: disbursement.status,
        fee_cents: disbursement.express_fee_cents,
        estimated_arrival: estimated_arrival_for(disbursement.rail, disbursement.initiated_at),
    }
}

fn transfer_result_from_repayment(repayment: &Repayment) -> TransferResult {
    TransferResult {
        record_id: repayment.id.clone(),
        kind: TransferKind::Repayment,
        provider_ref: repayment.provider_ref.clone().unwrap_or_default(),
        rail: repayment.rail.unwrap_or(Rail::Ach),
        status: repayment.status,
        fee_cents: 0,
        estimated_arrival: estimated_arrival_for(repayment.rail, repayment.initiated_at),
    }
}

fn estimated_arrival_for(rail: Option<Rail>, initiated_at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let rail = rail.unwrap_or(Rail::Ach);
    let local = initiated_at.unwrap_or_else(Utc::now).with_timezone(&business_hours_offset(0));
    bigfin_routing::estimated_arrival(rail, local).with_timezone(&Utc)
}

/// Resolves the `AvailabilityPolicy`'s business-hours offset into a
/// `FixedOffset`, falling back to UTC for an out-of-range configuration
/// value rather than panicking.
fn business_hours_offset(offset_minutes: i32) -> FixedOffset {
    let seconds = offset_minutes.clamp(-720, 840) * 60;
    FixedOffset::east_opt(seconds).unwrap_or_else(|| unreachable!("clamped offset is always in range"))
}

/// Flat express fee for `amount_cents`, preferring the product's own fee
/// bands when configured and falling back to the routing engine's
/// built-in bands otherwise.
fn express_fee_for(fees_policy: &bigfin_policy::FeesPolicy, amount_cents: u64) -> u32 {
    if fees_policy.express_fee_bands_cents.is_empty() {
        return bigfin_routing::fee(amount_cents);
    }
    fees_policy
        .express_fee_bands_cents
        .iter()
        .find(|(ceiling, _)| amount_cents <= *ceiling)
        .map_or_else(
            || {
                fees_policy
                    .express_fee_bands_cents
                    .last()
                    .map(|(_, fee)| *fee)
                    .unwrap_or_else(|| bigfin_routing::fee(amount_cents))
            },
            |(_, fee)| *fee,
        )
}

fn rail_to_str(rail: Rail) -> &'static str {
    match rail {
        Rail::Ach => "ach",
        Rail::SameDayAch => "same_day_ach",
        Rail::PushToCard => "push_to_card",
        Rail::Fednow => "fednow",
        Rail::Rtp => "rtp",
    }
}

fn rail_from_str(value: &str) -> PaymentsResult<Rail> {
    match value {
        "ach" => Ok(Rail::Ach),
        "same_day_ach" => Ok(Rail::SameDayAch),
        "push_to_card" => Ok(Rail::PushToCard),
        "fednow" => Ok(Rail::Fednow),
        "rtp" => Ok(Rail::Rtp),
        other => Err(PaymentsError::Internal(format!("unknown rail {other}"))),
    }
}

fn status_to_str(status: TransferStatus) -> &'static str {
    match status {
        TransferStatus::Initiated => "initiated",
        TransferStatus::Pending => "pending",
        TransferStatus::Completed => "completed",
        TransferStatus::Failed => "failed",
        TransferStatus::Returned => "returned",
        TransferStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(value: &str) -> PaymentsResult<TransferStatus> {
    match value {
        "initiated" => Ok(TransferStatus::Initiated),
        "pending" => Ok(TransferStatus::Pending),
        "completed" => Ok(TransferStatus::Completed),
        "failed" => Ok(TransferStatus::Failed),
        "returned" => Ok(TransferStatus::Returned),
        "cancelled" => Ok(TransferStatus::Cancelled),
        other => Err(PaymentsError::Internal(format!("unknown status {other}"))),
    }
}

fn kind_to_str(kind: TransferKind) -> &'static str {
    match kind {
        TransferKind::Disbursement => "disbursement",
        TransferKind::Repayment => "repayment",
    }
}

fn kind_from_str(value: &str) -> PaymentsResult<TransferKind> {
    match value {
        "disbursement" => Ok(TransferKind::Disbursement),
        "repayment" => Ok(TransferKind::Repayment),
        other => Err(PaymentsError::Internal(format!("unknown kind {other}"))),
    }
}

fn serialize_result(result: &TransferResult) -> String {
    serde_json::json!({
        "record_id": result.record_id,
        "kind": kind_to_str(result.kind),
        "provider_ref": result.provider_ref,
        "rail": rail_to_str(result.rail),
        "status": status_to_str(result.status),
        "fee_cents": result.fee_cents,
        "estimated_arrival": result.estimated_arrival.to_rfc3339(),
    })
    .to_string()
}

fn parse_cached_result(response: &str) -> PaymentsResult<TransferResult> {
    let value: serde_json::Value =
        serde_json::from_str(response).map_err(|err| PaymentsError::Internal(err.to_string()))?;
    let field = |key: &str| -> PaymentsResult<String> {
        value
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PaymentsError::Internal(format!("missing {key} in cached response")))
    };
    Ok(TransferResult {
        record_id: field("record_id")?,
        kind: kind_from_str(&field("kind")?)?,
        provider_ref: field("provider_ref")?,
        rail: rail_from_str(&field("rail")?)?,
        status: status_from_str(&field("status")?)?,
        fee_cents: value
            .get("fee_cents")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32,
        estimated_arrival: DateTime::parse_from_rfc3339(&field("estimated_arrival")?)
            .map_err(|err| PaymentsError::Internal(err.to_string()))?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use bigfin_audit::NoopAuditHook;
    use bigfin_ledger::InMemoryLedgerEngine;
    use bigfin_tenancy::InMemoryIdempotencyStore;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::AvailabilityState;
    use crate::DisbursementSource;
    use crate::InMemoryContractStore;
    use crate::InMemoryDisbursementStore;
    use crate::InMemoryInstrumentStore;
    use crate::InMemoryPaymentProvider;
    use crate::InMemoryPrefundStore;
    use crate::InMemoryRepaymentStore;

    fn test_orchestrator(
        disbursements: Arc<InMemoryDisbursementStore>,
        repayments: Arc<InMemoryRepaymentStore>,
    ) -> TransferOrchestrator {
        TransferOrchestrator::new(
            Arc::new(InMemoryPaymentProvider::new()),
            Arc::new(InMemoryInstrumentStore::new()),
            disbursements,
            repayments,
            Arc::new(InMemoryContractStore::new()),
            Arc::new(InMemoryPrefundStore::new()),
            Arc::new(InMemoryLedgerEngine::new()),
            Arc::new(InMemoryIdempotencyStore::new()),
            Arc::new(NoopAuditHook),
        )
    }

    fn sample_disbursement(provider_ref: &str) -> Disbursement {
        Disbursement {
            id: "disb-1".into(),
            tenant_id: "tenant-1".into(),
            contract_id: "contract-1".into(),
            amount_cents: 10_000,
            status: TransferStatus::Pending,
            availability_state: AvailabilityState::Pending,
            provider_ref: Some(provider_ref.into()),
            rail: Some(Rail::Ach),
            idempotency_key: None,
            initiated_at: Some(Utc::now()),
            completed_at: None,
            failed_at: None,
            failure_reason: None,
            express_fee_cents: 0,
            net_amount_cents: 10_000,
            source: DisbursementSource::Direct,
            settlement_journal_id: None,
        }
    }

    #[tokio::test]
    async fn get_finds_a_disbursement_by_provider_ref() {
        let disbursements = Arc::new(InMemoryDisbursementStore::new());
        disbursements
            .insert(sample_disbursement("prov-ref-1"))
            .await
            .expect("insert disbursement");
        let orchestrator = test_orchestrator(disbursements, Arc::new(InMemoryRepaymentStore::new()));

        let result = orchestrator
            .get(&"tenant-1".to_string(), "prov-ref-1")
            .await
            .expect("get")
            .expect("some result");
        assert_eq!(result.record_id, "disb-1");
        assert_eq!(result.kind, TransferKind::Disbursement);
        assert_eq!(result.status, TransferStatus::Pending);
    }

    #[tokio::test]
    async fn get_returns_none_for_an_unknown_provider_ref() {
        let orchestrator = test_orchestrator(
            Arc::new(InMemoryDisbursementStore::new()),
            Arc::new(InMemoryRepaymentStore::new()),
        );
        let result = orchestrator
            .get(&"tenant-1".to_string(), "no-such-ref")
            .await
            .expect("get");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn cancel_marks_a_pending_disbursement_cancelled() {
        let disbursements = Arc::new(InMemoryDisbursementStore::new());
        disbursements
            .insert(sample_disbursement("prov-ref-2"))
            .await
            .expect("insert disbursement");
        let orchestrator = test_orchestrator(disbursements.clone(), Arc::new(InMemoryRepaymentStore::new()));

        orchestrator
            .cancel(&"tenant-1".to_string(), "prov-ref-2")
            .await
            .expect("cancel");

        let updated = disbursements
            .get(&"tenant-1".to_string(), &"disb-1".to_string())
            .await
            .expect("fetch disbursement");
        assert_eq!(updated.status, TransferStatus::Cancelled);
        assert_eq!(updated.availability_state, AvailabilityState::Failed);
    }

    #[tokio::test]
    async fn cancel_rejects_an_already_completed_disbursement() {
        let disbursements = Arc::new(InMemoryDisbursementStore::new());
        let mut completed = sample_disbursement("prov-ref-3");
        completed.status = TransferStatus::Completed;
        disbursements.insert(completed).await.expect("insert disbursement");
        let orchestrator = test_orchestrator(disbursements, Arc::new(InMemoryRepaymentStore::new()));

        let result = orchestrator.cancel(&"tenant-1".to_string(), "prov-ref-3").await;
        assert!(matches!(result, Err(PaymentsError::InvalidState(_))));
    }

    #[tokio::test]
    async fn cancel_returns_not_found_for_an_unknown_provider_ref() {
        let orchestrator = test_orchestrator(
            Arc::new(InMemoryDisbursementStore::new()),
            Arc::new(InMemoryRepaymentStore::new()),
        );
        let result = orchestrator.cancel(&"tenant-1".to_string(), "no-such-ref").await;
        assert!(matches!(result, Err(PaymentsError::NotFound(_))));
    }
}
