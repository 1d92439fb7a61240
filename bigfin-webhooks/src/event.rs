use bigfin_payments::ProviderStatus;
use chrono::DateTime;
use chrono::Utc;

use crate::WebhooksError;
use crate::WebhooksResult;

/// Raw webhook envelope: `{event_id, type, data, created_on}`. Parsing
/// rejects any payload missing `event_id`, `type`, or `data`; `created_on`
/// defaults to the time of parsing when the provider omits it.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub data: serde_json::Value,
    pub created_on: DateTime<Utc>,
}

pub fn parse_event(raw_body: &[u8]) -> WebhooksResult<WebhookEvent> {
    let value: serde_json::Value =
        serde_json::from_slice(raw_body).map_err(|err| WebhooksError::Malformed(err.to_string()))?;

    let event_id = value
        .get("event_id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| WebhooksError::Malformed("missing event_id".into()))?
        .to_string();
    let event_type = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| WebhooksError::Malformed("missing type".into()))?
        .to_string();
    let data = value
        .get("data")
        .cloned()
        .ok_or_else(|| WebhooksError::Malformed("missing data".into()))?;
    let created_on = value
        .get("created_on")
        .and_then(serde_json::Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map_or_else(Utc::now, |parsed| parsed.with_timezone(&Utc));

    Ok(WebhookEvent {
        event_id,
        event_type,
        data,
        created_on,
    })
}

/// Recognized `transfer.*` event types this crate routes to the transfer
/// orchestrator. Any other `type` — including the recognized-but-inert
/// `bank-account.*`, `card.*`, and `payment-method.*` families — is
/// logged and acknowledged without a domain-level effect, since no store
/// in this workspace yet tracks instrument-side provider callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEventKind {
    Created,
    Pending,
    Completed,
    Failed,
    Reversed,
}

impl TransferEventKind {
    #[must_use]
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "transfer.created" => Some(Self::Created),
            "transfer.pending" => Some(Self::Pending),
            "transfer.completed" => Some(Self::Completed),
            "transfer.failed" => Some(Self::Failed),
            "transfer.reversed" => Some(Self::Reversed),
            _ => None,
        }
    }

    #[must_use]
    pub fn provider_status(self) -> ProviderStatus {
        match self {
            TransferEventKind::Created => ProviderStatus::Processing,
            TransferEventKind::Pending => ProviderStatus::Pending,
            TransferEventKind::Completed => ProviderStatus::Completed,
            TransferEventKind::Failed => ProviderStatus::Failed,
            TransferEventKind::Reversed => ProviderStatus::Returned,
        }
    }
}

/// Pulls `tenant_id` and `provider_ref` (the provider's transfer id) out
/// of a transfer event's `data` object. Both are required to route the
/// update to the right tenant-scoped record; their absence is a malformed
/// payload rather than an unrecognized one.
pub fn extract_transfer_fields(data: &serde_json::Value) -> WebhooksResult<(String, String)> {
    let tenant_id = data
        .get("tenant_id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| WebhooksError::Malformed("transfer event missing data.tenant_id".into()))?
        .to_string();
    let provider_ref = data
        .get("id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| WebhooksError::Malformed("transfer event missing data.id".into()))?
        .to_string();
    Ok((tenant_id, provider_ref))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_well_formed_event() {
        let raw = br#"{"event_id":"evt_1","type":"transfer.completed","data":{"id":"tr_1"},"created_on":"2026-01-01T00:00:00Z"}"#;
        let event = parse_event(raw).expect("parse");
        assert_eq!(event.event_id, "evt_1");
        assert_eq!(event.event_type, "transfer.completed");
    }

    #[test]
    fn rejects_a_payload_missing_event_id() {
        let raw = br#"{"type":"transfer.completed","data":{}}"#;
        assert!(matches!(parse_event(raw), Err(WebhooksError::Malformed(_))));
    }

    #[test]
    fn rejects_a_payload_missing_data() {
        let raw = br#"{"event_id":"evt_1","type":"transfer.completed"}"#;
        assert!(matches!(parse_event(raw), Err(WebhooksError::Malformed(_))));
    }

    #[test]
    fn defaults_created_on_when_absent() {
        let raw = br#"{"event_id":"evt_1","type":"transfer.completed","data":{}}"#;
        let event = parse_event(raw).expect("parse");
        assert!(event.created_on <= Utc::now());
    }

    #[test]
    fn classifies_every_documented_transfer_event() {
        assert_eq!(
            TransferEventKind::from_event_type("transfer.created"),
            Some(TransferEventKind::Created)
        );
        assert_eq!(
            TransferEventKind::from_event_type("transfer.pending"),
            Some(TransferEventKind::Pending)
        );
        assert_eq!(
            TransferEventKind::from_event_type("transfer.completed"),
            Some(TransferEventKind::Completed)
        );
        assert_eq!(
            TransferEventKind::from_event_type("transfer.failed"),
            Some(TransferEventKind::Failed)
        );
        assert_eq!(
            TransferEventKind::from_event_type("transfer.reversed"),
            Some(TransferEventKind::Reversed)
        );
        assert_eq!(TransferEventKind::from_event_type("bank-account.created"), None);
    }
}
