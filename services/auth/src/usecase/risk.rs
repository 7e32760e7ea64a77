use std::collections::BTreeMap;
use std::net::IpAddr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Timelike;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ridepool_domain::id::UserId;

use crate::domain::keys;
use crate::domain::repository::{AuditLog, EphemeralStore};
use crate::domain::types::{
    AuthEvent, DAY_SECS, PatternPolicy, RiskAssessment, RiskIndicator, RiskOutcome,
    SecurityEvent, SecurityEventType, Severity,
};
use crate::error::StoreError;
use crate::usecase::lockout::LockoutGuard;
use crate::usecase::rate_limit::increment_in_window;

const LOGIN_HOURS_TTL_SECS: u64 = 30 * DAY_SECS;
const DEVICE_HISTORY_TTL_SECS: u64 = 90 * DAY_SECS;
const LOCATION_HISTORY_TTL_SECS: u64 = 60 * DAY_SECS;
const RECENT_ATTEMPTS_TTL_SECS: u64 = 30 * DAY_SECS;
const RECENT_ATTEMPTS_KEPT: usize = 100;
const RECENT_ATTEMPTS_REPORTED: usize = 10;
const VELOCITY_WINDOW_SECS: u64 = 5 * 60;

pub const LOCK_SCORE: u32 = 8;
pub const SUSPICIOUS_SCORE: u32 = 5;
pub const NOTICE_SCORE: u32 = 3;

pub const UNKNOWN_LOCATION: &str = "UNKNOWN";

/// Deterministic fingerprint of a user agent plus key-sorted device attributes.
pub fn device_fingerprint(user_agent: Option<&str>, attributes: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.unwrap_or_default().as_bytes());
    for (key, value) in attributes {
        hasher.update(b"|");
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    URL_SAFE_NO_PAD.encode(&hasher.finalize()[..16])
}

/// Coarse network bucket: IPv4 /16 (`a.b.x.x`) or IPv6 /48.
pub fn location_indicator(source_address: Option<&str>) -> String {
    let Some(raw) = source_address.map(str::trim).filter(|s| !s.is_empty()) else {
        return UNKNOWN_LOCATION.to_owned();
    };
    match raw.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let [a, b, _, _] = v4.octets();
            format!("{a}.{b}.x.x")
        }
        Ok(IpAddr::V6(v6)) => {
            let s = v6.segments();
            format!("{:x}:{:x}:{:x}::/48", s[0], s[1], s[2])
        }
        Err(_) => UNKNOWN_LOCATION.to_owned(),
    }
}

/// Distance between two hours of the day, wrapping at midnight.
pub fn hour_distance(a: u32, b: u32) -> u32 {
    let d = a.abs_diff(b) % 24;
    d.min(24 - d)
}

/// Velocity tiers are exclusive: the rapid tier replaces the quick tier.
fn velocity_indicator(count: i64) -> Option<RiskIndicator> {
    if count > 3 {
        Some(RiskIndicator::RapidAuthenticationAttempts)
    } else if count > 2 {
        Some(RiskIndicator::MultipleQuickAttempts)
    } else {
        None
    }
}

/// Scores successful authentications against the user's history and acts on the score band.
///
/// Each signal is isolated: a store failure in one contributes nothing and the rest still run.
pub struct PatternRiskScorer<S: EphemeralStore, L: AuditLog> {
    pub store: S,
    pub audit: L,
    pub lockout: LockoutGuard<S, L>,
    pub policy: PatternPolicy,
}

impl<S: EphemeralStore, L: AuditLog> PatternRiskScorer<S, L> {
    pub async fn evaluate(&self, event: &AuthEvent) -> RiskOutcome {
        if !self.policy.enabled {
            return RiskOutcome::default();
        }

        let mut outcome = RiskOutcome::default();
        let signals = [
            ("time", self.time_signal(event).await),
            ("device", self.device_signal(event).await),
            ("location", self.location_signal(event).await),
            ("velocity", self.velocity_signal(event).await),
        ];
        for (signal, result) in signals {
            match result {
                Ok(indicators) => outcome.indicators.extend(indicators),
                Err(e) => warn!(error = %e, user_id = %event.user_id, signal, "risk signal failed"),
            }
        }

        if let Err(e) = self.record_attempt(event).await {
            warn!(error = %e, user_id = %event.user_id, "failed to record authentication attempt");
        }
        if let Err(e) = self.act_on(event, &outcome).await {
            warn!(error = %e, user_id = %event.user_id, "failed to apply risk action");
        }
        debug!(
            user_id = %event.user_id,
            score = outcome.score(),
            indicators = ?outcome.indicators,
            "authentication scored"
        );
        outcome
    }

    /// History is updated after the check, so the first login never scores as unusual.
    async fn time_signal(&self, event: &AuthEvent) -> Result<Vec<RiskIndicator>, StoreError> {
        let key = keys::login_hours(event.user_id);
        let hour = event.occurred_at.hour();
        let known: Vec<u32> = self
            .store
            .smembers(&key)
            .await?
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();

        let mut indicators = Vec::new();
        let threshold = self.policy.unusual_hour_threshold;
        if !known.is_empty() && known.iter().all(|&h| hour_distance(h, hour) > threshold) {
            indicators.push(RiskIndicator::UnusualLoginTime);
        }

        self.store.sadd(&key, &hour.to_string()).await?;
        self.store.expire(&key, LOGIN_HOURS_TTL_SECS).await?;
        Ok(indicators)
    }

    async fn device_signal(&self, event: &AuthEvent) -> Result<Vec<RiskIndicator>, StoreError> {
        let fingerprint = device_fingerprint(event.user_agent.as_deref(), &event.device_attributes);
        self.novelty_signal(
            &keys::device_history(event.user_id),
            &fingerprint,
            self.policy.device_change_threshold,
            (RiskIndicator::NewDevice, RiskIndicator::FrequentDeviceChanges),
            DEVICE_HISTORY_TTL_SECS,
        )
        .await
    }

    async fn location_signal(&self, event: &AuthEvent) -> Result<Vec<RiskIndicator>, StoreError> {
        let location = location_indicator(event.source_address.as_deref());
        self.novelty_signal(
            &keys::location_history(event.user_id),
            &location,
            self.policy.location_change_threshold,
            (RiskIndicator::NewLocation, RiskIndicator::FrequentLocationChanges),
            LOCATION_HISTORY_TTL_SECS,
        )
        .await
    }

    /// Shared new/frequent check. An empty history never flags: the first observation is
    /// accepted as the baseline.
    async fn novelty_signal(
        &self,
        key: &str,
        observed: &str,
        change_threshold: u32,
        (new, frequent): (RiskIndicator, RiskIndicator),
        ttl_secs: u64,
    ) -> Result<Vec<RiskIndicator>, StoreError> {
        let known = self.store.smembers(key).await?;
        let mut indicators = Vec::new();
        if !known.is_empty() && !known.iter().any(|k| k == observed) {
            indicators.push(new);
            if known.len() >= change_threshold as usize {
                indicators.push(frequent);
            }
        }
        self.store.sadd(key, observed).await?;
        self.store.expire(key, ttl_secs).await?;
        Ok(indicators)
    }

    async fn velocity_signal(&self, event: &AuthEvent) -> Result<Vec<RiskIndicator>, StoreError> {
        let count =
            increment_in_window(&self.store, &keys::velocity(event.user_id), VELOCITY_WINDOW_SECS)
                .await?;
        Ok(velocity_indicator(count).into_iter().collect())
    }

    async fn record_attempt(&self, event: &AuthEvent) -> Result<(), StoreError> {
        let key = keys::recent_attempts(event.user_id);
        let entry = json!({
            "at": event.occurred_at,
            "location": location_indicator(event.source_address.as_deref()),
            "device": device_fingerprint(event.user_agent.as_deref(), &event.device_attributes),
        });
        self.store
            .lpush_trim(&key, &entry.to_string(), RECENT_ATTEMPTS_KEPT)
            .await?;
        self.store.expire(&key, RECENT_ATTEMPTS_TTL_SECS).await?;
        Ok(())
    }

    async fn act_on(&self, event: &AuthEvent, outcome: &RiskOutcome) -> Result<(), StoreError> {
        let score = outcome.score();
        let describe = |band: &str| format!("{band} risk score {score}: {:?}", outcome.indicators);
        if score >= LOCK_SCORE {
            self.lockout
                .lock(&event.identifier, "HIGH_RISK_PATTERN", Some(event.user_id))
                .await?;
            self.audit.record(
                SecurityEvent::new(SecurityEventType::RiskPattern, Severity::Critical, describe("high"))
                    .user(event.user_id)
                    .identifier(&event.identifier),
            );
        } else if score >= SUSPICIOUS_SCORE {
            self.lockout
                .track_suspicious_activity(&event.identifier, "MEDIUM_RISK_PATTERN")
                .await?;
            self.audit.record(
                SecurityEvent::new(SecurityEventType::RiskPattern, Severity::High, describe("medium"))
                    .user(event.user_id)
                    .identifier(&event.identifier),
            );
        } else if score >= NOTICE_SCORE {
            self.audit.record(
                SecurityEvent::new(SecurityEventType::RiskPattern, Severity::Medium, describe("low"))
                    .user(event.user_id)
                    .identifier(&event.identifier),
            );
        }
        Ok(())
    }

    pub async fn assessment(&self, user_id: UserId) -> Result<RiskAssessment, StoreError> {
        let recent = self
            .store
            .lrange(&keys::recent_attempts(user_id), RECENT_ATTEMPTS_REPORTED)
            .await?;
        Ok(RiskAssessment {
            user_id,
            monitoring_enabled: self.policy.enabled,
            recent_attempt_count: recent.len(),
            known_device_count: self.store.scard(&keys::device_history(user_id)).await?,
            known_location_count: self.store.scard(&keys::location_history(user_id)).await?,
        })
    }
}

/// One-way handle for scoring events off the request path.
///
/// `submit` never waits; events are dropped with a warning when the queue is full.
#[derive(Clone)]
pub struct RiskMonitor {
    tx: Option<mpsc::Sender<AuthEvent>>,
}

impl RiskMonitor {
    /// Start a worker that scores events in arrival order. The worker exits once every
    /// handle has been dropped and the queue drained.
    pub fn spawn<S, L>(scorer: PatternRiskScorer<S, L>, capacity: usize) -> (Self, JoinHandle<()>)
    where
        S: EphemeralStore + Send + Sync + 'static,
        L: AuditLog,
    {
        let (tx, mut rx) = mpsc::channel::<AuthEvent>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                scorer.evaluate(&event).await;
            }
            info!("risk monitor stopped");
        });
        (Self { tx: Some(tx) }, worker)
    }

    /// A monitor that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn submit(&self, event: AuthEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "worker stopped",
            };
            warn!(reason, "risk event dropped");
        }
    }
}
