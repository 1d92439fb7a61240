use std::sync::Arc;

use bigfin_webhooks::WebhookHandler;

use crate::error::ApiResult;
use crate::telemetry::Telemetry;

/// Thin pass-through over [`WebhookHandler`] that records telemetry and
/// converts domain errors into the wire-facing taxonomy.
#[derive(Clone)]
pub struct WebhooksFacade {
    handler: Arc<WebhookHandler>,
    telemetry: Arc<Telemetry>,
}

impl WebhooksFacade {
    #[must_use]
    pub fn new(handler: Arc<WebhookHandler>, telemetry: Arc<Telemetry>) -> Self {
        Self { handler, telemetry }
    }

    pub async fn handle(
        &self,
        timestamp: &str,
        raw_body: &[u8],
        signature_hex: &str,
    ) -> ApiResult<()> {
        self.handler
            .handle(timestamp, raw_body, signature_hex)
            .await?;
        self.telemetry.record_webhook_event_handled();
        Ok(())
    }
}
