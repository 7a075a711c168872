use crate::storage::Store;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// No link or QR code matches the short code; callers render a
    /// "link doesn't exist" page for this
    #[error("short code not found")]
    NotFound,
    /// Lookup infrastructure failed; callers render a generic error page
    #[error("resolution failed")]
    Storage(#[from] anyhow::Error),
}

/// The destination a short code resolves to
#[derive(Debug, Clone)]
pub struct Resolution {
    pub destination: String,
}

/// Resolves an inbound short code to its destination URL.
///
/// Strictly read-only: analytics recording happens in the independent
/// [`crate::clicks::ClickRecorder`] so resolver latency is never coupled to
/// write latency or enrichment cost.
pub struct RedirectResolver {
    store: Arc<dyn Store>,
}

impl RedirectResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Look up a link by code, falling back to a QR code with the same code
    /// (legacy entry paths dereference a QR code's own code directly). The
    /// destination is returned unchanged; normalization is the caller's
    /// concern.
    pub async fn resolve(&self, code: &str) -> Result<Resolution, ResolveError> {
        if let Some(link) = self.store.get_link(code).await? {
            return Ok(Resolution {
                destination: link.destination,
            });
        }

        if let Some(qr) = self.store.get_qr_code(code).await? {
            return Ok(Resolution {
                destination: qr.destination,
            });
        }

        Err(ResolveError::NotFound)
    }
}
