#![deny(clippy::print_stdout, clippy::print_stderr)]

//! The composition root: wires the ledger, routing, payments,
//! webhooks, and reconciliation engines together behind thin facades,
//! and collapses every crate's domain error into one wire-facing
//! taxonomy (§6.5).

pub mod error;
mod ledger_facade;
mod payments_facade;
mod reconciliation_facade;
mod system;
pub mod telemetry;
mod webhooks_facade;

pub use error::ApiError;
pub use error::ApiErrorCode;
pub use error::ApiResult;
pub use ledger_facade::LedgerFacade;
pub use payments_facade::PaymentsFacade;
pub use reconciliation_facade::ReconciliationFacade;
pub use system::BigFinSystem;
pub use telemetry::Telemetry;
pub use telemetry::TelemetryCounters;
pub use webhooks_facade::WebhooksFacade;
