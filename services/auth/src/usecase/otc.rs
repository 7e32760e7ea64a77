use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngExt;
use sha2::Sha256;
use tracing::{debug, info};
use uuid::Uuid;

use ridepool_domain::channel::Channel;

use crate::domain::keys;
use crate::domain::repository::{AuditLog, EphemeralStore};
use crate::domain::types::{
    HOUR_SECS, IssuedCode, OtcPolicy, OtcRecord, OtcVerification, SecurityEvent,
    SecurityEventType, Severity,
};
use crate::error::AuthServiceError;
use crate::usecase::rate_limit::{increment_in_window, read_counter};

type HmacSha256 = Hmac<Sha256>;

fn generate_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

fn keyed_mac(pepper: &str, channel: &Channel, code: &str) -> HmacSha256 {
    // HMAC takes keys of any length; a failure here means a broken crypto build.
    let mut mac =
        HmacSha256::new_from_slice(pepper.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(channel.key().as_bytes());
    mac.update(b":");
    mac.update(code.as_bytes());
    mac
}

/// HMAC-SHA256 of `channel:code` under the server pepper, base64-encoded.
pub fn hash_code(pepper: &str, channel: &Channel, code: &str) -> String {
    STANDARD.encode(keyed_mac(pepper, channel, code).finalize().into_bytes())
}

/// Constant-time comparison of a candidate against a stored hash.
fn code_matches(pepper: &str, channel: &Channel, candidate: &str, stored_hash: &str) -> bool {
    let Ok(expected) = STANDARD.decode(stored_hash) else {
        return false;
    };
    keyed_mac(pepper, channel, candidate)
        .verify_slice(&expected)
        .is_ok()
}

fn remaining_secs(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((expires_at - now).num_seconds()).unwrap_or(0).max(1)
}

/// Issues and verifies one-time codes per delivery channel.
///
/// At most one code is outstanding per channel: issuing again overwrites the previous
/// record and resets its attempt counter.
pub struct OtcManager<S: EphemeralStore, L: AuditLog> {
    pub store: S,
    pub audit: L,
    pub policy: OtcPolicy,
    pub pepper: String,
}

impl<S: EphemeralStore, L: AuditLog> OtcManager<S, L> {
    /// Rejected requests are not counted against the hourly issuance ceiling.
    pub async fn issue(&self, channel: &Channel) -> Result<IssuedCode, AuthServiceError> {
        let issued_key = keys::otc_issued(channel);
        let ceiling = self.policy.max_issuances_per_hour;
        if read_counter(&self.store, &issued_key).await? >= ceiling {
            info!(channel = %channel, ceiling, "code issuance ceiling reached");
            return Err(AuthServiceError::RateLimitExceeded);
        }
        let issued = increment_in_window(&self.store, &issued_key, HOUR_SECS).await?;
        if issued > i64::from(ceiling) {
            // Lost the last slot to a concurrent request; give the increment back.
            self.store.decr(&issued_key).await?;
            info!(channel = %channel, ceiling, "code issuance ceiling reached");
            return Err(AuthServiceError::RateLimitExceeded);
        }

        let code = generate_code(self.policy.code_length);
        let now = Utc::now();
        let ttl = self.policy.ttl_secs;
        let record = OtcRecord {
            issue_id: Uuid::new_v4(),
            code_hash: hash_code(&self.pepper, channel, &code),
            channel: channel.kind(),
            created_at: now,
            expires_at: now + Duration::seconds(i64::try_from(ttl).unwrap_or(i64::MAX)),
            verified: false,
            attempts: 0,
        };
        let json =
            serde_json::to_string(&record).map_err(|e| AuthServiceError::Internal(e.into()))?;
        self.store.set_ex(&keys::otc(channel), &json, ttl).await?;
        self.store.del(&keys::otc_attempts(channel)).await?;

        debug!(channel = %channel, "code issued");
        self.audit.record(
            SecurityEvent::new(SecurityEventType::OtcIssued, Severity::Low, "code issued")
                .identifier(channel.address()),
        );
        Ok(IssuedCode {
            code,
            expires_at: record.expires_at,
        })
    }

    pub async fn verify(
        &self,
        channel: &Channel,
        candidate: &str,
    ) -> Result<OtcVerification, AuthServiceError> {
        let candidate = candidate.trim();
        if candidate.len() != self.policy.code_length
            || !candidate.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(AuthServiceError::Validation(format!(
                "code must be {} digits",
                self.policy.code_length
            )));
        }

        let record = self.load(channel).await?.ok_or(AuthServiceError::OtcNotFound)?;
        let now = Utc::now();

        if record.verified {
            return Err(AuthServiceError::OtcAlreadyUsed);
        }
        if record.is_expired(now) {
            self.delete(channel).await?;
            return Err(AuthServiceError::OtcExpired);
        }
        if record.attempts >= self.policy.max_attempts {
            self.delete(channel).await?;
            return Err(AuthServiceError::OtcMaxAttempts);
        }

        if code_matches(&self.pepper, channel, candidate, &record.code_hash) {
            let ttl = remaining_secs(record.expires_at, now);
            // Exactly one verification claims the code; every other one lost the race.
            let claimed = self
                .store
                .set_nx_ex(
                    &keys::otc_consumed(channel, record.issue_id),
                    &now.to_rfc3339(),
                    ttl,
                )
                .await?;
            if !claimed {
                return Err(AuthServiceError::OtcAlreadyUsed);
            }
            let verified = OtcRecord {
                verified: true,
                ..record
            };
            let json = serde_json::to_string(&verified)
                .map_err(|e| AuthServiceError::Internal(e.into()))?;
            self.store.set_xx_ex(&keys::otc(channel), &json, ttl).await?;
            info!(channel = %channel, "code verified");
            return Ok(OtcVerification::Verified);
        }

        let attempts = increment_in_window(
            &self.store,
            &keys::otc_attempts(channel),
            remaining_secs(record.expires_at, now),
        )
        .await?;
        let attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
        let remaining_attempts = self.policy.max_attempts.saturating_sub(attempts);
        if remaining_attempts == 0 {
            // The cycle is over; the next verify reports NotFound.
            self.delete(channel).await?;
        }
        self.audit.record(
            SecurityEvent::new(
                SecurityEventType::OtcFailure,
                Severity::Medium,
                format!("incorrect code, {remaining_attempts} attempts remaining"),
            )
            .identifier(channel.address()),
        );
        Ok(OtcVerification::Rejected { remaining_attempts })
    }

    pub async fn delete(&self, channel: &Channel) -> Result<(), AuthServiceError> {
        self.store.del(&keys::otc(channel)).await?;
        self.store.del(&keys::otc_attempts(channel)).await?;
        Ok(())
    }

    /// Attempts left on the outstanding code, `None` if there is none.
    pub async fn remaining_attempts(&self, channel: &Channel) -> Result<Option<u32>, AuthServiceError> {
        Ok(self
            .load(channel)
            .await?
            .map(|r| self.policy.max_attempts.saturating_sub(r.attempts)))
    }

    /// Whether an unexpired, unconsumed code is outstanding.
    pub async fn has_valid_code(&self, channel: &Channel) -> Result<bool, AuthServiceError> {
        let now = Utc::now();
        Ok(self
            .load(channel)
            .await?
            .is_some_and(|r| !r.verified && !r.is_expired(now)))
    }

    async fn load(&self, channel: &Channel) -> Result<Option<OtcRecord>, AuthServiceError> {
        let Some(json) = self.store.get(&keys::otc(channel)).await? else {
            return Ok(None);
        };
        let mut record: OtcRecord =
            serde_json::from_str(&json).map_err(|e| AuthServiceError::Internal(e.into()))?;
        record.attempts = read_counter(&self.store, &keys::otc_attempts(channel)).await?;
        Ok(Some(record))
    }
}
