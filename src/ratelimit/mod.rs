//! Persisted rate limiter protecting sensitive mutation endpoints.
//!
//! State per identifier moves Unseen -> Active(count) -> Blocked(until);
//! windows expire lazily on the next attempt, never by a sweeper. The
//! check-and-update runs as one atomic storage operation per identifier.

use crate::storage::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit check failed")]
    Storage(#[from] anyhow::Error),
}

/// Attempt cap, window and block duration for one call site. The algorithm
/// is identical for every site; only the numbers differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub window_ms: i64,
    pub block_duration_ms: i64,
}

impl RateLimitPolicy {
    /// Strict policy for credential-adjacent endpoints
    pub fn credential_checks() -> Self {
        Self {
            max_attempts: 5,
            window_ms: 15 * 60 * 1000,
            block_duration_ms: 30 * 60 * 1000,
        }
    }

    /// Looser policy for generic API traffic
    pub fn api_traffic() -> Self {
        Self {
            max_attempts: 100,
            window_ms: 60 * 60 * 1000,
            block_duration_ms: 60 * 1000,
        }
    }
}

/// Allow/block decision for one attempt. `Blocked` is a normal outcome,
/// not an error; callers render it as a 429-equivalent with the
/// retry-after duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Blocked { until_ms: i64, retry_after: Duration },
}

/// Window-based attempt limiter keyed by caller-constructed identifiers
/// (e.g. client address + route name)
pub struct RateLimiter {
    store: Arc<dyn Store>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Count one attempt for the identifier and decide.
    ///
    /// First attempt creates the record; while a block is in effect the
    /// count never moves; once the window elapses the count resets to 1;
    /// an increment past the cap sets the block.
    pub async fn check(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> Result<Decision, RateLimitError> {
        let now = crate::models::now_millis();
        let record = self.store.rate_limit_attempt(identifier, policy, now).await?;

        match record.blocked_until {
            Some(until) if until > now => {
                warn!(identifier, until, "identifier blocked by rate limiter");
                Ok(Decision::Blocked {
                    until_ms: until,
                    retry_after: Duration::from_millis((until - now).max(0) as u64),
                })
            }
            _ => {
                let remaining = (policy.max_attempts as i64 - record.attempts).max(0) as u32;
                Ok(Decision::Allowed { remaining })
            }
        }
    }

    /// Forgive all prior attempts, e.g. after a successful credential
    /// verification
    pub async fn reset(&self, identifier: &str) -> Result<(), RateLimitError> {
        self.store.reset_rate_limit(identifier).await?;
        Ok(())
    }
}
