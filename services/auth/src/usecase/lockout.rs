use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use ridepool_domain::channel::mask_identifier;
use ridepool_domain::id::UserId;

use crate::domain::keys;
use crate::domain::repository::{AuditLog, EphemeralStore};
use crate::domain::types::{
    DAY_SECS, HOUR_SECS, LockoutPolicy, LockoutStatus, SecurityEvent, SecurityEventType, Severity,
};
use crate::error::StoreError;
use crate::usecase::rate_limit::{increment_in_window, read_counter};

/// IP failures at which a rate-limit violation is reported.
const IP_VIOLATION_THRESHOLD: i64 = 5;
/// IP failures at which a challenge is demanded.
const IP_CHALLENGE_THRESHOLD: u32 = 3;
/// Identifier failures at which a challenge is demanded.
const CHALLENGE_THRESHOLD: u32 = 2;

/// Failed-attempt counting, lockouts and suspicious-activity tracking per identifier.
///
/// An identifier is locked exactly while its lockout key is alive.
pub struct LockoutGuard<S: EphemeralStore, L: AuditLog> {
    pub store: S,
    pub audit: L,
    pub policy: LockoutPolicy,
}

impl<S: EphemeralStore, L: AuditLog> LockoutGuard<S, L> {
    /// Count a failure in the hourly window. Returns `true` when this failure locked the identifier.
    pub async fn record_failed_attempt(
        &self,
        identifier: &str,
        attempt_type: &str,
    ) -> Result<bool, StoreError> {
        let count =
            increment_in_window(&self.store, &keys::failed_attempts(identifier), HOUR_SECS).await?;
        info!(
            identifier = %mask_identifier(identifier),
            attempt_type,
            count,
            "failed attempt recorded"
        );
        if count >= i64::from(self.policy.max_failed_attempts) {
            self.lock(identifier, "MAX_FAILED_ATTEMPTS", None).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Count a failure against a source address. Returns the post-increment count.
    pub async fn record_ip_failed_attempt(
        &self,
        ip: &str,
        attempt_type: &str,
    ) -> Result<u32, StoreError> {
        let count = increment_in_window(&self.store, &keys::ip_failed_attempts(ip), HOUR_SECS).await?;
        if count >= IP_VIOLATION_THRESHOLD {
            self.audit.record(SecurityEvent::new(
                SecurityEventType::RateLimitViolation,
                Severity::High,
                format!("{count} failed {attempt_type} attempts from {ip}"),
            ));
        }
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    pub async fn is_locked(&self, identifier: &str) -> Result<bool, StoreError> {
        self.store.exists(&keys::lockout(identifier)).await
    }

    /// Write a lockout record expiring after the configured duration. Returns the unlock time.
    pub async fn lock(
        &self,
        identifier: &str,
        reason: &str,
        user_id: Option<UserId>,
    ) -> Result<DateTime<Utc>, StoreError> {
        let duration = self.policy.lockout_duration_secs;
        let until = Utc::now() + Duration::seconds(i64::try_from(duration).unwrap_or(i64::MAX));
        self.store
            .set_ex(&keys::lockout(identifier), &until.to_rfc3339(), duration)
            .await?;
        warn!(
            identifier = %mask_identifier(identifier),
            reason,
            locked_until = %until,
            "identifier locked"
        );
        let mut event = SecurityEvent::new(
            SecurityEventType::AccountLocked,
            Severity::High,
            format!("locked: {reason}"),
        )
        .identifier(identifier);
        event.user_id = user_id;
        self.audit.record(event);
        Ok(until)
    }

    /// Administrative unlock. Also forgets failures so the next mistake does not re-lock.
    /// Returns `true` if a lockout was lifted.
    pub async fn unlock(&self, identifier: &str) -> Result<bool, StoreError> {
        let lifted = self.store.del(&keys::lockout(identifier)).await?;
        self.clear_failed_attempts(identifier).await?;
        if lifted {
            self.audit.record(
                SecurityEvent::new(
                    SecurityEventType::AccountUnlocked,
                    Severity::Medium,
                    "unlocked by administrator",
                )
                .identifier(identifier),
            );
        }
        Ok(lifted)
    }

    pub async fn lockout_end(&self, identifier: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let raw = self.store.get(&keys::lockout(identifier)).await?;
        Ok(raw
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc)))
    }

    pub async fn failed_attempts(&self, identifier: &str) -> Result<u32, StoreError> {
        read_counter(&self.store, &keys::failed_attempts(identifier)).await
    }

    pub async fn clear_failed_attempts(&self, identifier: &str) -> Result<(), StoreError> {
        self.store.del(&keys::failed_attempts(identifier)).await?;
        Ok(())
    }

    /// Count one occurrence of `activity` in a 24-hour window. Returns `true` when the
    /// threshold is reached, which also locks the identifier.
    pub async fn track_suspicious_activity(
        &self,
        identifier: &str,
        activity: &str,
    ) -> Result<bool, StoreError> {
        let count = increment_in_window(
            &self.store,
            &keys::suspicious(identifier, activity),
            DAY_SECS,
        )
        .await?;
        let exceeded = count >= i64::from(self.policy.suspicious_threshold);
        let severity = if exceeded { Severity::High } else { Severity::Medium };
        self.audit.record(
            SecurityEvent::new(
                SecurityEventType::SuspiciousActivity,
                severity,
                format!("{activity} x{count}"),
            )
            .identifier(identifier),
        );
        if exceeded {
            self.lock(identifier, activity, None).await?;
        }
        Ok(exceeded)
    }

    /// Whether to demand an extra human-verification step before the next attempt.
    ///
    /// Fails closed: a store error demands the challenge.
    pub async fn should_require_challenge(&self, identifier: &str, ip: Option<&str>) -> bool {
        match self.challenge_signals(identifier, ip).await {
            Ok(required) => required,
            Err(e) => {
                warn!(error = %e, "challenge check failed, requiring challenge");
                true
            }
        }
    }

    async fn challenge_signals(&self, identifier: &str, ip: Option<&str>) -> Result<bool, StoreError> {
        let failed = self.failed_attempts(identifier).await?;
        let ip_failed = match ip {
            Some(ip) => read_counter(&self.store, &keys::ip_failed_attempts(ip)).await?,
            None => 0,
        };
        let near_lockout = failed > 0 && failed >= self.policy.max_failed_attempts.saturating_sub(2);
        Ok(failed >= CHALLENGE_THRESHOLD || ip_failed >= IP_CHALLENGE_THRESHOLD || near_lockout)
    }

    pub async fn status(&self, identifier: &str) -> Result<LockoutStatus, StoreError> {
        let locked_until = self.lockout_end(identifier).await?;
        Ok(LockoutStatus {
            locked: locked_until.is_some() || self.is_locked(identifier).await?,
            locked_until,
            failed_attempts: self.failed_attempts(identifier).await?,
        })
    }
}
