//! The wire-facing error taxonomy every facade in this crate maps into.
//! Each domain crate below keeps its own `thiserror` enum scoped to its
//! own concerns; this is the single place those enums get collapsed into
//! the vocabulary a caller on the other side of an API boundary sees.

use bigfin_ledger::LedgerError;
use bigfin_payments::PaymentsError;
use bigfin_policy::PolicyError;
use bigfin_reconcile::ReconcileError;
use bigfin_routing::RoutingError;
use bigfin_tenancy::TenancyError;
use bigfin_webhooks::WebhooksError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    Unauthorized,
    Forbidden,
    StepUpRequired,
    InvalidRequest,
    InvalidParameter,
    TermsOutOfPolicy,
    InvalidState,
    AlreadyExists,
    NotFound,
    InsufficientFunds,
    InstrumentInvalid,
    PaymentFailed,
    PaymentReturned,
    LimitExceeded,
    RateLimited,
    InternalError,
    ServiceUnavailable,
    ProviderError,
}

#[derive(Debug, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(value: LedgerError) -> Self {
        let code = match &value {
            LedgerError::NotFound(_) => ApiErrorCode::NotFound,
            LedgerError::Rejected(_) => ApiErrorCode::InvalidState,
            LedgerError::Validation(_) => ApiErrorCode::InvalidRequest,
            LedgerError::Internal(_) => ApiErrorCode::InternalError,
        };
        ApiError::new(code, value.to_string())
    }
}

impl From<RoutingError> for ApiError {
    fn from(value: RoutingError) -> Self {
        let code = match &value {
            RoutingError::NoAvailableRail => ApiErrorCode::InstrumentInvalid,
        };
        ApiError::new(code, value.to_string())
    }
}

impl From<PaymentsError> for ApiError {
    fn from(value: PaymentsError) -> Self {
        let code = match &value {
            PaymentsError::NotFound(_) => ApiErrorCode::NotFound,
            PaymentsError::Validation(_) => ApiErrorCode::InvalidRequest,
            PaymentsError::InvalidState(_) => ApiErrorCode::InvalidState,
            PaymentsError::AlreadyExists(_) => ApiErrorCode::AlreadyExists,
            PaymentsError::InsufficientFunds(_) => ApiErrorCode::InsufficientFunds,
            PaymentsError::InstrumentInvalid(_) => ApiErrorCode::InstrumentInvalid,
            PaymentsError::PaymentFailed(_) => ApiErrorCode::PaymentFailed,
            PaymentsError::PaymentReturned(_) => ApiErrorCode::PaymentReturned,
            PaymentsError::ProviderError { .. } => ApiErrorCode::ProviderError,
            PaymentsError::Internal(_) => ApiErrorCode::InternalError,
        };
        ApiError::new(code, value.to_string())
    }
}

impl From<ReconcileError> for ApiError {
    fn from(value: ReconcileError) -> Self {
        let code = match &value {
            ReconcileError::RunNotFound(_) => ApiErrorCode::NotFound,
            ReconcileError::Provider(_) => ApiErrorCode::ProviderError,
            ReconcileError::Storage(_) => ApiErrorCode::ServiceUnavailable,
            ReconcileError::Internal(_) => ApiErrorCode::InternalError,
        };
        ApiError::new(code, value.to_string())
    }
}

impl From<WebhooksError> for ApiError {
    fn from(value: WebhooksError) -> Self {
        let code = match &value {
            WebhooksError::SignatureInvalid => ApiErrorCode::Unauthorized,
            WebhooksError::Malformed(_) => ApiErrorCode::InvalidRequest,
            WebhooksError::Orchestrator(_) => ApiErrorCode::ProviderError,
        };
        ApiError::new(code, value.to_string())
    }
}

impl From<PolicyError> for ApiError {
    fn from(value: PolicyError) -> Self {
        let code = match &value {
            PolicyError::Validation(_) => ApiErrorCode::InvalidRequest,
            PolicyError::NotFound(_) => ApiErrorCode::NotFound,
            PolicyError::Storage(_) => ApiErrorCode::ServiceUnavailable,
        };
        ApiError::new(code, value.to_string())
    }
}

impl From<TenancyError> for ApiError {
    fn from(value: TenancyError) -> Self {
        let code = match &value {
            TenancyError::Validation(_) => ApiErrorCode::InvalidRequest,
            TenancyError::NotFound(_) => ApiErrorCode::NotFound,
            TenancyError::Conflict(_) => ApiErrorCode::AlreadyExists,
            TenancyError::Internal(_) => ApiErrorCode::InternalError,
        };
        ApiError::new(code, value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn insufficient_funds_maps_to_its_own_code() {
        let err = ApiError::from(PaymentsError::InsufficientFunds("short by 500".into()));
        assert_eq!(err.code, ApiErrorCode::InsufficientFunds);
    }

    #[test]
    fn signature_invalid_maps_to_unauthorized() {
        let err = ApiError::from(WebhooksError::SignatureInvalid);
        assert_eq!(err.code, ApiErrorCode::Unauthorized);
    }

    #[test]
    fn provider_error_variant_preserves_code() {
        let err = ApiError::from(PaymentsError::ProviderError {
            attempted_rails: "ach,rtp".into(),
            message: "provider unreachable".into(),
        });
        assert_eq!(err.code, ApiErrorCode::ProviderError);
        assert!(err.message.contains("ach,rtp"));
    }
}
