//! Fire-and-forget telemetry

use std::sync::Arc;

use crate::storage::RecordStore;
use crate::types::AnalyticsEvent;

/// Writes analytics events to the record store and mirrors them to tracing.
///
/// Failures are logged and swallowed; telemetry never affects a request.
#[derive(Clone)]
pub struct AnalyticsSink {
    store: Arc<dyn RecordStore>,
}

impl AnalyticsSink {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, event: AnalyticsEvent) {
        if event.success {
            tracing::debug!(
                kind = event.kind.as_str(),
                duration_ms = event.duration_ms,
                tokens = event.token_count,
                documents = event.document_count,
                "analytics event"
            );
        } else {
            tracing::warn!(
                kind = event.kind.as_str(),
                details = %event.details,
                "analytics event (failure)"
            );
        }

        if let Err(e) = self.store.record_event(&event).await {
            tracing::warn!("Failed to record analytics event: {}", e);
        }
    }
}
