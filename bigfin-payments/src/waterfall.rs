use bigfin_policy::OverpaymentPolicy;
use bigfin_policy::WaterfallBucket;
use bigfin_policy::WaterfallPolicy;

use crate::PaymentsError;
use crate::PaymentsResult;

/// A repayment cash receipt split into its fee/interest/principal
/// components, per the §4.4 waterfall: applied strictly in bucket
/// order, each bucket taking `min(remaining_amount, current_balance)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaterfallSplit {
    pub applied_fee_cents: u64,
    pub applied_interest_cents: u64,
    pub applied_principal_cents: u64,
}

impl WaterfallSplit {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.applied_fee_cents + self.applied_interest_cents + self.applied_principal_cents
    }
}

/// Splits `amount_cents` across the contract's outstanding `fees_cents`,
/// `interest_cents`, and `principal_cents` balances in the order the
/// policy names. Any amount left over once every bucket is exhausted is
/// either folded into principal (`OverpaymentPolicy::Prepay`, the
/// product default) or rejected outright.
pub fn apply_waterfall(
    policy: &WaterfallPolicy,
    amount_cents: u64,
    fees_cents: u64,
    interest_cents: u64,
    principal_cents: u64,
) -> PaymentsResult<WaterfallSplit> {
    let mut remaining = amount_cents;
    let mut split = WaterfallSplit::default();

    for bucket in &policy.order {
        if remaining == 0 {
            break;
        }
        let (balance, applied) = match bucket {
            WaterfallBucket::Fees => (fees_cents, &mut split.applied_fee_cents),
            WaterfallBucket::Interest => (interest_cents, &mut split.applied_interest_cents),
            WaterfallBucket::Principal => (principal_cents, &mut split.applied_principal_cents),
        };
        let take = remaining.min(balance);
        *applied += take;
        remaining -= take;
    }

    if remaining > 0 {
        match policy.overpayment {
            OverpaymentPolicy::Prepay => split.applied_principal_cents += remaining,
            OverpaymentPolicy::Reject => {
                return Err(PaymentsError::Validation(format!(
                    "repayment of {amount_cents} exceeds outstanding balance by {remaining}"
                )));
            }
        }
    }

    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_across_all_three_buckets_in_order() {
        let policy = WaterfallPolicy::default();
        let split = apply_waterfall(&policy, 1_000, 100, 200, 5_000).expect("split");
        assert_eq!(split.applied_fee_cents, 100);
        assert_eq!(split.applied_interest_cents, 200);
        assert_eq!(split.applied_principal_cents, 700);
        assert_eq!(split.total(), 1_000);
    }

    #[test]
    fn exact_payoff_leaves_nothing_over() {
        let policy = WaterfallPolicy::default();
        let split = apply_waterfall(&policy, 300, 100, 200, 0).expect("split");
        assert_eq!(split.applied_fee_cents, 100);
        assert_eq!(split.applied_interest_cents, 200);
        assert_eq!(split.applied_principal_cents, 0);
    }

    #[test]
    fn overpayment_defaults_to_principal_prepay() {
        let policy = WaterfallPolicy::default();
        let split = apply_waterfall(&policy, 10_000, 100, 200, 5_000).expect("split");
        assert_eq!(split.applied_fee_cents, 100);
        assert_eq!(split.applied_interest_cents, 200);
        assert_eq!(split.applied_principal_cents, 5_000 + 4_700);
        assert_eq!(split.total(), 10_000);
    }

    #[test]
    fn overpayment_is_rejected_when_policy_says_so() {
        let policy = WaterfallPolicy {
            overpayment: OverpaymentPolicy::Reject,
            ..WaterfallPolicy::default()
        };
        let err = apply_waterfall(&policy, 10_000, 100, 200, 5_000).unwrap_err();
        assert!(matches!(err, PaymentsError::Validation(_)));
    }
}
