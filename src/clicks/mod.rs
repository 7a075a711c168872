use crate::classify::UserAgentClassifier;
use crate::models::{now_millis, ClickTarget, NewClickEvent, RawClick};
use crate::storage::Store;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("click recording failed")]
    Storage(#[from] anyhow::Error),
}

/// Outcome of one recording attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Event appended and aggregate incremented on this entity
    Recorded(ClickTarget),
    /// Automated traffic; nothing was written
    Ignored,
    /// Neither a link nor a QR code matched the code
    NotFound,
}

/// Ingests raw traffic events for resolved short codes.
///
/// Delivery is at-least-once: no idempotency key exists, so a retried
/// delivery of the same physical click double-counts. Callers invoke this
/// out-of-band of the redirect response; failures here are logged by the
/// caller and never delay the redirect.
pub struct ClickRecorder {
    store: Arc<dyn Store>,
    classifier: Arc<dyn UserAgentClassifier>,
}

impl ClickRecorder {
    pub fn new(store: Arc<dyn Store>, classifier: Arc<dyn UserAgentClassifier>) -> Self {
        Self { store, classifier }
    }

    /// Record one traffic event against the entity owning `code`.
    ///
    /// Bot traffic is a hard gate: classified bots produce no writes at
    /// all. A link carrying a QR reference routes the event to the QR code
    /// as a scan, never double-counting both sides of the pairing; a code
    /// matching only a QR code is attributed to that QR code directly.
    pub async fn record(&self, code: &str, raw: RawClick) -> Result<RecordOutcome, RecordError> {
        let classification = self.classifier.classify(&raw.user_agent);
        if classification.is_bot {
            debug!(code, "dropping automated traffic");
            return Ok(RecordOutcome::Ignored);
        }

        let target = match self.store.get_link(code).await? {
            Some(link) => match link.qr_code_ref {
                // Scans of a QR-backed link are scan events on the QR code
                Some(qr_ref) => match self.store.get_qr_code(&qr_ref).await? {
                    Some(qr) => ClickTarget::QrCode(qr.code),
                    None => return Ok(RecordOutcome::NotFound),
                },
                None => ClickTarget::Link(link.code),
            },
            None => match self.store.get_qr_code(code).await? {
                Some(qr) => ClickTarget::QrCode(qr.code),
                None => return Ok(RecordOutcome::NotFound),
            },
        };

        let event = NewClickEvent {
            address: raw.address,
            browser: classification.browser,
            os: classification.os,
            device: classification.device,
            referrer: raw.referrer,
            language: raw.language,
            timezone: raw.timezone,
            country: raw.country,
            region: raw.region,
            city: raw.city,
            path: raw.path,
            query_params: raw.query_params,
            created_at: now_millis(),
        };

        self.store.record_click(&target, &event).await?;

        Ok(RecordOutcome::Recorded(target))
    }
}
