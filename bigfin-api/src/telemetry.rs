//! Operational counters surfaced alongside the facades. No metrics
//! backend is wired up here (out of scope); this just gives a caller
//! something to poll or log periodically.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryCounters {
    pub disbursements_initiated: u64,
    pub repayments_initiated: u64,
    pub transfer_status_updates: u64,
    pub webhook_events_handled: u64,
    pub reconciliation_runs: u64,
    pub reconciliation_exceptions: u64,
    pub reconciliation_auto_resolved: u64,
}

#[derive(Default)]
pub struct Telemetry {
    counters: Mutex<TelemetryCounters>,
}

impl Telemetry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F: FnOnce(&mut TelemetryCounters)>(&self, f: F) {
        if let Ok(mut counters) = self.counters.lock() {
            f(&mut counters);
        }
    }

    pub fn record_disbursement_initiated(&self) {
        self.update(|counters| counters.disbursements_initiated += 1);
    }

    pub fn record_repayment_initiated(&self) {
        self.update(|counters| counters.repayments_initiated += 1);
    }

    pub fn record_transfer_status_update(&self) {
        self.update(|counters| counters.transfer_status_updates += 1);
    }

    pub fn record_webhook_event_handled(&self) {
        self.update(|counters| counters.webhook_events_handled += 1);
    }

    pub fn record_reconciliation_run(&self, exceptions: usize, auto_resolved: usize) {
        self.update(|counters| {
            counters.reconciliation_runs += 1;
            counters.reconciliation_exceptions += exceptions as u64;
            counters.reconciliation_auto_resolved += auto_resolved as u64;
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> TelemetryCounters {
        self.counters
            .lock()
            .map(|counters| *counters)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn counters_accumulate() {
        let telemetry = Telemetry::new();
        telemetry.record_disbursement_initiated();
        telemetry.record_repayment_initiated();
        telemetry.record_transfer_status_update();
        telemetry.record_webhook_event_handled();
        telemetry.record_reconciliation_run(3, 1);

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.disbursements_initiated, 1);
        assert_eq!(snapshot.repayments_initiated, 1);
        assert_eq!(snapshot.transfer_status_updates, 1);
        assert_eq!(snapshot.webhook_events_handled, 1);
        assert_eq!(snapshot.reconciliation_runs, 1);
        assert_eq!(snapshot.reconciliation_exceptions, 3);
        assert_eq!(snapshot.reconciliation_auto_resolved, 1);
    }
}
