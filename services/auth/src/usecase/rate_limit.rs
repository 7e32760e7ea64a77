use tracing::warn;

use crate::domain::keys;
use crate::domain::repository::EphemeralStore;
use crate::domain::types::{RateLimitPolicy, RateLimitPurpose, RateLimitStatus};
use crate::error::StoreError;

/// Increment a windowed counter, anchoring the window TTL on the first increment.
///
/// Only the caller that observes `1` sets the TTL. If two callers both see `1` after an
/// expiry race the second `EXPIRE` just re-anchors the same window.
pub(crate) async fn increment_in_window<S: EphemeralStore>(
    store: &S,
    key: &str,
    window_secs: u64,
) -> Result<i64, StoreError> {
    let count = store.incr(key).await?;
    if count == 1 {
        store.expire(key, window_secs).await?;
    }
    Ok(count)
}

/// Read a counter without touching it; missing or garbled values read as 0.
pub(crate) async fn read_counter<S: EphemeralStore>(store: &S, key: &str) -> Result<u32, StoreError> {
    let raw = store.get(key).await?;
    Ok(raw.and_then(|v| v.parse::<u32>().ok()).unwrap_or(0))
}

/// Fixed-ceiling counters per `(purpose, identifier)`.
pub struct RateLimiter<S: EphemeralStore> {
    pub store: S,
    pub policy: RateLimitPolicy,
}

impl<S: EphemeralStore> RateLimiter<S> {
    /// Count this request and report whether it is within `max_count` for the window.
    ///
    /// Fails open: when the store is unreachable the request is allowed.
    pub async fn allow(&self, key: &str, max_count: u32, window_secs: u64) -> bool {
        match increment_in_window(&self.store, key, window_secs).await {
            Ok(count) => count <= i64::from(max_count),
            Err(e) => {
                warn!(error = %e, key, "rate limit store unavailable, allowing request");
                true
            }
        }
    }

    pub fn ceiling(&self, purpose: RateLimitPurpose) -> u32 {
        match purpose {
            RateLimitPurpose::OtcRequest => self.policy.otc_requests_per_hour,
            RateLimitPurpose::LoginAttempt => self.policy.login_attempts_per_hour,
            RateLimitPurpose::Api => self.policy.api_requests_per_minute,
        }
    }

    pub async fn allow_purpose(&self, purpose: RateLimitPurpose, identifier: &str) -> bool {
        self.allow(
            &keys::rate_limit(purpose, identifier),
            self.ceiling(purpose),
            purpose.window_secs(),
        )
        .await
    }

    pub async fn remaining(
        &self,
        purpose: RateLimitPurpose,
        identifier: &str,
    ) -> Result<u32, StoreError> {
        let used = read_counter(&self.store, &keys::rate_limit(purpose, identifier)).await?;
        Ok(self.ceiling(purpose).saturating_sub(used))
    }

    /// Seconds until the current window closes; `0` when no window is open.
    pub async fn time_until_reset(
        &self,
        purpose: RateLimitPurpose,
        identifier: &str,
    ) -> Result<u64, StoreError> {
        let ttl = self
            .store
            .ttl(&keys::rate_limit(purpose, identifier))
            .await?;
        Ok(ttl.unwrap_or(0))
    }

    pub async fn status(&self, identifier: &str) -> Result<Vec<RateLimitStatus>, StoreError> {
        let mut statuses = Vec::with_capacity(RateLimitPurpose::ALL.len());
        for purpose in RateLimitPurpose::ALL {
            statuses.push(RateLimitStatus {
                purpose,
                remaining: self.remaining(purpose, identifier).await?,
                resets_in_secs: self.time_until_reset(purpose, identifier).await?,
            });
        }
        Ok(statuses)
    }

    /// Drop every purpose's window for the identifier.
    pub async fn reset(&self, identifier: &str) -> Result<(), StoreError> {
        for purpose in RateLimitPurpose::ALL {
            self.store.del(&keys::rate_limit(purpose, identifier)).await?;
        }
        Ok(())
    }
}
