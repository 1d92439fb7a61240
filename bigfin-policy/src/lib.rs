#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Per-product configuration loaded once per product version. The
//! originating system carries these as loosely-typed JSON documents
//! (term schema, fees policy, waterfall policy, availability policy);
//! here each is a validated value object so the rest of the workspace
//! gets compile-time-exhaustive handling instead of parsing structural
//! JSON at every call site.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

pub type ProductVersion = String;
pub type PolicyResult<T> = Result<T, PolicyError>;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentFrequency {
    Weekly,
    Biweekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermSchema {
    pub min_principal_cents: u64,
    pub max_principal_cents: u64,
    pub min_term_months: u32,
    pub max_term_months: u32,
    pub max_apr_bps: u32,
    pub allowed_frequencies: Vec<PaymentFrequency>,
}

impl TermSchema {
    /// Validates a proposed `(principal, term, apr, frequency)` tuple
    /// against this product's term bounds. Returns the out-of-policy
    /// reason rather than a bare bool so callers can surface
    /// `TERMS_OUT_OF_POLICY` with detail.
    pub fn check(
        &self,
        principal_cents: u64,
        term_months: u32,
        apr_bps: u32,
        frequency: PaymentFrequency,
    ) -> PolicyResult<()> {
        if principal_cents < self.min_principal_cents || principal_cents > self.max_principal_cents
        {
            return Err(PolicyError::Validation(format!(
                "principal {principal_cents} outside allowed range {}..={}",
                self.min_principal_cents, self.max_principal_cents
            )));
        }
        if term_months < self.min_term_months || term_months > self.max_term_months {
            return Err(PolicyError::Validation(format!(
                "term {term_months} outside allowed range {}..={}",
                self.min_term_months, self.max_term_months
            )));
        }
        if apr_bps > self.max_apr_bps {
            return Err(PolicyError::Validation(format!(
                "apr {apr_bps}bps exceeds product ceiling {}bps",
                self.max_apr_bps
            )));
        }
        if !self.allowed_frequencies.contains(&frequency) {
            return Err(PolicyError::Validation(
                "payment frequency not permitted for this product".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeKind {
    Late,
    Nsf,
    Express,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeesPolicy {
    pub late_fee_cents: u32,
    pub nsf_fee_cents: u32,
    /// Express-transfer fee bands, overriding the routing engine's
    /// defaults for this product. Empty means "use the routing engine's
    /// built-in bands".
    #[serde(default)]
    pub express_fee_bands_cents: Vec<(u64, u32)>,
}

impl FeesPolicy {
    #[must_use]
    pub fn flat_fee_for(&self, kind: FeeKind) -> Option<u32> {
        match kind {
            FeeKind::Late => Some(self.late_fee_cents),
            FeeKind::Nsf => Some(self.nsf_fee_cents),
            FeeKind::Express => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaterfallBucket {
    Fees,
    Interest,
    Principal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverpaymentPolicy {
    /// Residual after all buckets are exhausted is applied as an
    /// additional principal decrement. This is the product default.
    Prepay,
    /// Residual after all buckets are exhausted is refused outright.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallPolicy {
    /// Bucket application order. The spec's default and only documented
    /// order is fees, then interest, then principal.
    pub order: Vec<WaterfallBucket>,
    pub overpayment: OverpaymentPolicy,
}

impl Default for WaterfallPolicy {
    fn default() -> Self {
        Self {
            order: vec![
                WaterfallBucket::Fees,
                WaterfallBucket::Interest,
                WaterfallBucket::Principal,
            ],
            overpayment: OverpaymentPolicy::Prepay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityPolicy {
    /// Offset (minutes east of UTC) defining "local" business hours for
    /// routing ETA math. The spec leaves the timezone implementer-defined;
    /// this is the configuration input that resolves it.
    pub business_hours_utc_offset_minutes: i32,
    /// `Some(minutes)` means newly-received funds are held for this long
    /// before entering `AVAILABLE`; `None` means no blanket hold policy.
    pub standard_hold_minutes: Option<i64>,
    /// Whether a customer's first ever completed transfer is held
    /// regardless of `standard_hold_minutes`.
    pub hold_first_transaction: bool,
    /// Transfers at or above this amount are held even for established
    /// customers. `None` disables the amount-band hold rule.
    pub hold_amount_threshold_cents: Option<u64>,
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self {
            business_hours_utc_offset_minutes: 0,
            standard_hold_minutes: None,
            hold_first_transaction: true,
            hold_amount_threshold_cents: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationPolicy {
    pub high_severity_threshold_cents: i64,
    pub critical_severity_threshold_cents: i64,
    pub auto_resolve_threshold_cents: i64,
    pub auto_resolve_enabled: bool,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            high_severity_threshold_cents: 10_000,
            critical_severity_threshold_cents: 100_000,
            auto_resolve_threshold_cents: 100,
            auto_resolve_enabled: true,
        }
    }
}

/// The full set of policy documents loaded for one product version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPolicy {
    pub product_version: ProductVersion,
    pub term_schema: TermSchema,
    pub fees_policy: FeesPolicy,
    pub waterfall_policy: WaterfallPolicy,
    pub availability_policy: AvailabilityPolicy,
    pub reconciliation_policy: ReconciliationPolicy,
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn get(&self, product_version: &ProductVersion) -> PolicyResult<ProductPolicy>;

    async fn upsert(&self, policy: ProductPolicy) -> PolicyResult<()>;
}

#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<HashMap<ProductVersion, ProductPolicy>>,
}

impl InMemoryPolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get(&self, product_version: &ProductVersion) -> PolicyResult<ProductPolicy> {
        self.policies
            .read()
            .await
            .get(product_version)
            .cloned()
            .ok_or_else(|| PolicyError::NotFound(format!("product {product_version}")))
    }

    async fn upsert(&self, policy: ProductPolicy) -> PolicyResult<()> {
        self.policies
            .write()
            .await
            .insert(policy.product_version.clone(), policy);
        Ok(())
    }
}

/// Backing persistence a `DurablePolicyStore` caches in front of.
#[async_trait]
pub trait PolicyPersistence: Send + Sync {
    async fn load(&self, product_version: &ProductVersion) -> PolicyResult<ProductPolicy>;

    async fn save(&self, policy: ProductPolicy) -> PolicyResult<()>;
}

/// Cache-aside wrapper: reads hit an in-memory cache first and fall
/// through to `persistence` on a miss; writes go to `persistence` first
/// and only populate the cache once that succeeds.
pub struct DurablePolicyStore<P: PolicyPersistence> {
    persistence: Arc<P>,
    cache: RwLock<HashMap<ProductVersion, ProductPolicy>>,
}

impl<P: PolicyPersistence> DurablePolicyStore<P> {
    #[must_use]
    pub fn new(persistence: Arc<P>) -> Self {
        Self {
            persistence,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<P: PolicyPersistence> PolicyStore for DurablePolicyStore<P> {
    async fn get(&self, product_version: &ProductVersion) -> PolicyResult<ProductPolicy> {
        if let Some(cached) = self.cache.read().await.get(product_version) {
            return Ok(cached.clone());
        }
        let loaded = self.persistence.load(product_version).await?;
        self.cache
            .write()
            .await
            .insert(product_version.clone(), loaded.clone());
        Ok(loaded)
    }

    async fn upsert(&self, policy: ProductPolicy) -> PolicyResult<()> {
        self.persistence.save(policy.clone()).await?;
        self.cache
            .write()
            .await
            .insert(policy.product_version.clone(), policy);
        Ok(())
    }
}

/// Placeholder for a real relational-store-backed `PolicyPersistence`.
/// The concrete schema and driver are out of scope for the core; this
/// stub exists so the composition root has somewhere to point a
/// `DurablePolicyStore` once one is wired up.
#[cfg(feature = "postgres-store")]
pub struct PostgresPolicyPersistence {
    connection_string: String,
}

#[cfg(feature = "postgres-store")]
impl PostgresPolicyPersistence {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

#[cfg(feature = "postgres-store")]
#[async_trait]
impl PolicyPersistence for PostgresPolicyPersistence {
    async fn load(&self, _product_version: &ProductVersion) -> PolicyResult<ProductPolicy> {
        let _ = &self.connection_string;
        Err(PolicyError::Storage("not yet implemented".into()))
    }

    async fn save(&self, _policy: ProductPolicy) -> PolicyResult<()> {
        Err(PolicyError::Storage("not yet implemented".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_policy() -> ProductPolicy {
        ProductPolicy {
            product_version: "v1".into(),
            term_schema: TermSchema {
                min_principal_cents: 10_000,
                max_principal_cents: 5_000_000,
                min_term_months: 3,
                max_term_months: 36,
                max_apr_bps: 3_600,
                allowed_frequencies: vec![PaymentFrequency::Biweekly, PaymentFrequency::Monthly],
            },
            fees_policy: FeesPolicy {
                late_fee_cents: 2_500,
                nsf_fee_cents: 3_000,
                express_fee_bands_cents: vec![],
            },
            waterfall_policy: WaterfallPolicy::default(),
            availability_policy: AvailabilityPolicy::default(),
            reconciliation_policy: ReconciliationPolicy::default(),
        }
    }

    #[test]
    fn term_schema_rejects_out_of_band_principal() {
        let schema = sample_policy().term_schema;
        let err = schema
            .check(5_000, 12, 2_000, PaymentFrequency::Monthly)
            .unwrap_err();
        assert!(matches!(err, PolicyError::Validation(_)));
    }

    #[test]
    fn term_schema_rejects_disallowed_frequency() {
        let schema = sample_policy().term_schema;
        let err = schema
            .check(100_000, 12, 2_000, PaymentFrequency::Weekly)
            .unwrap_err();
        assert!(matches!(err, PolicyError::Validation(_)));
    }

    #[test]
    fn term_schema_accepts_in_band_terms() {
        let schema = sample_policy().term_schema;
        schema
            .check(100_000, 12, 2_000, PaymentFrequency::Monthly)
            .expect("valid terms");
    }

    #[test]
    fn waterfall_default_is_fees_interest_principal_with_prepay() {
        let policy = WaterfallPolicy::default();
        assert_eq!(
            policy.order,
            vec![
                WaterfallBucket::Fees,
                WaterfallBucket::Interest,
                WaterfallBucket::Principal
            ]
        );
        assert_eq!(policy.overpayment, OverpaymentPolicy::Prepay);
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryPolicyStore::new();
        store
            .upsert(sample_policy())
            .await
            .expect("upsert policy");

        let fetched = store.get(&"v1".to_string()).await.expect("get policy");
        assert_eq!(fetched.product_version, "v1");
    }

    #[tokio::test]
    async fn missing_product_version_is_not_found() {
        let store = InMemoryPolicyStore::new();
        let err = store.get(&"missing".to_string()).await.unwrap_err();
        assert!(matches!(err, PolicyError::NotFound(_)));
    }

    struct RecordingPersistence {
        saved: RwLock<Option<ProductPolicy>>,
    }

    #[async_trait]
    impl PolicyPersistence for RecordingPersistence {
        async fn load(&self, product_version: &ProductVersion) -> PolicyResult<ProductPolicy> {
            self.saved
                .read()
                .await
                .clone()
                .filter(|p| &p.product_version == product_version)
                .ok_or_else(|| PolicyError::NotFound(product_version.clone()))
        }

        async fn save(&self, policy: ProductPolicy) -> PolicyResult<()> {
            *self.saved.write().await = Some(policy);
            Ok(())
        }
    }

    #[tokio::test]
    async fn durable_store_caches_after_first_load() {
        let persistence = Arc::new(RecordingPersistence {
            saved: RwLock::new(Some(sample_policy())),
        });
        let store = DurablePolicyStore::new(persistence);

        let first = store.get(&"v1".to_string()).await.expect("first load");
        let second = store.get(&"v1".to_string()).await.expect("cached load");
        assert_eq!(first, second);
    }
}
