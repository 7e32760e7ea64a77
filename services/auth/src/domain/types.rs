use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ridepool_domain::account::{AccountStatus, Permission, VerificationFlags};
use ridepool_domain::channel::ChannelKind;
use ridepool_domain::device::DeviceInfo;
use ridepool_domain::id::{SessionId, UserId};

// ── Defaults ─────────────────────────────────────────────────────────────────

pub const DEFAULT_OTC_LENGTH: usize = 6;
pub const DEFAULT_OTC_TTL_SECS: u64 = 5 * 60;
pub const DEFAULT_OTC_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_OTC_REQUESTS_PER_HOUR: u32 = 5;

pub const DEFAULT_LOGIN_ATTEMPTS_PER_HOUR: u32 = 10;
pub const DEFAULT_API_REQUESTS_PER_MINUTE: u32 = 60;

pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_DURATION_SECS: u64 = 30 * 60;
pub const DEFAULT_SUSPICIOUS_THRESHOLD: u32 = 10;

pub const DEFAULT_UNUSUAL_HOUR_THRESHOLD: u32 = 2;
pub const DEFAULT_DEVICE_CHANGE_THRESHOLD: u32 = 3;
pub const DEFAULT_LOCATION_CHANGE_THRESHOLD: u32 = 5;

pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 60 * 60;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 5;

pub const HOUR_SECS: u64 = 60 * 60;
pub const DAY_SECS: u64 = 24 * HOUR_SECS;

// ── Policies ─────────────────────────────────────────────────────────────────

/// One-time code issuance and verification limits.
#[derive(Debug, Clone)]
pub struct OtcPolicy {
    pub code_length: usize,
    pub ttl_secs: u64,
    pub max_attempts: u32,
    pub max_issuances_per_hour: u32,
}

impl Default for OtcPolicy {
    fn default() -> Self {
        Self {
            code_length: DEFAULT_OTC_LENGTH,
            ttl_secs: DEFAULT_OTC_TTL_SECS,
            max_attempts: DEFAULT_OTC_MAX_ATTEMPTS,
            max_issuances_per_hour: DEFAULT_OTC_REQUESTS_PER_HOUR,
        }
    }
}

/// Ceilings for the named sliding-window purposes.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub otc_requests_per_hour: u32,
    pub login_attempts_per_hour: u32,
    pub api_requests_per_minute: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            otc_requests_per_hour: DEFAULT_OTC_REQUESTS_PER_HOUR,
            login_attempts_per_hour: DEFAULT_LOGIN_ATTEMPTS_PER_HOUR,
            api_requests_per_minute: DEFAULT_API_REQUESTS_PER_MINUTE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub lockout_duration_secs: u64,
    pub suspicious_threshold: u32,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_duration_secs: DEFAULT_LOCKOUT_DURATION_SECS,
            suspicious_threshold: DEFAULT_SUSPICIOUS_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternPolicy {
    pub enabled: bool,
    pub unusual_hour_threshold: u32,
    pub device_change_threshold: u32,
    pub location_change_threshold: u32,
}

impl Default for PatternPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            unusual_hour_threshold: DEFAULT_UNUSUAL_HOUR_THRESHOLD,
            device_change_threshold: DEFAULT_DEVICE_CHANGE_THRESHOLD,
            location_change_threshold: DEFAULT_LOCATION_CHANGE_THRESHOLD,
        }
    }
}

/// Token signing and session lifetime settings.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub secret: String,
    pub issuer: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    /// Live sessions per user; `0` disables the cap.
    pub max_concurrent_sessions: usize,
}

// ── Accounts ─────────────────────────────────────────────────────────────────

/// Auth-relevant account data owned by the accounts service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub phone_number: String,
    pub email: Option<String>,
    pub flags: VerificationFlags,
    pub status: AccountStatus,
}

// ── One-time codes ───────────────────────────────────────────────────────────

/// Stored state of an outstanding one-time code. The plaintext is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtcRecord {
    /// Distinguishes successive codes on the same channel.
    pub issue_id: Uuid,
    pub code_hash: String,
    pub channel: ChannelKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    /// Lives in its own atomic counter; filled in on load.
    #[serde(skip)]
    pub attempts: u32,
}

impl OtcRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Plaintext code handed to delivery exactly once.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtcVerification {
    Verified,
    Rejected { remaining_attempts: u32 },
}

// ── Rate limiting & lockout ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPurpose {
    OtcRequest,
    LoginAttempt,
    Api,
}

impl RateLimitPurpose {
    pub const ALL: [Self; 3] = [Self::OtcRequest, Self::LoginAttempt, Self::Api];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OtcRequest => "otc_request",
            Self::LoginAttempt => "login_attempt",
            Self::Api => "api",
        }
    }

    pub fn window_secs(self) -> u64 {
        match self {
            Self::OtcRequest | Self::LoginAttempt => HOUR_SECS,
            Self::Api => 60,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub purpose: RateLimitPurpose,
    pub remaining: u32,
    pub resets_in_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LockoutStatus {
    pub locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
}

/// Pending human-verification challenge bound to an identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: Uuid,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

// ── Risk scoring ─────────────────────────────────────────────────────────────

/// A successful authentication, as fed to the risk scorer.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub user_id: UserId,
    /// Identifier lockouts are keyed by (the phone number).
    pub identifier: String,
    pub source_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_attributes: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskIndicator {
    UnusualLoginTime,
    NewDevice,
    FrequentDeviceChanges,
    NewLocation,
    FrequentLocationChanges,
    MultipleQuickAttempts,
    RapidAuthenticationAttempts,
}

impl RiskIndicator {
    pub fn weight(self) -> u32 {
        match self {
            Self::UnusualLoginTime => 2,
            Self::NewDevice => 3,
            Self::FrequentDeviceChanges => 2,
            Self::NewLocation => 2,
            Self::FrequentLocationChanges => 3,
            Self::MultipleQuickAttempts => 2,
            Self::RapidAuthenticationAttempts => 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RiskOutcome {
    pub indicators: Vec<RiskIndicator>,
}

impl RiskOutcome {
    pub fn score(&self) -> u32 {
        self.indicators.iter().map(|i| i.weight()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub user_id: UserId,
    pub monitoring_enabled: bool,
    pub recent_attempt_count: usize,
    pub known_device_count: u64,
    pub known_location_count: u64,
}

// ── Sessions ─────────────────────────────────────────────────────────────────

/// Live session record, keyed by session id with TTL = refresh-token lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub device: DeviceInfo,
    pub flags: VerificationFlags,
    pub account_status: AccountStatus,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refresh_token_id: Uuid,
    pub access_token_id: Uuid,
    pub access_expires_at: DateTime<Utc>,
}

/// Token pair returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndReason {
    UserLogout,
    SecurityEvent,
    DeviceRevoked,
    Expired,
    SessionLimit,
}

/// Durable mirror of a session's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAuditEntry {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub device: DeviceInfo,
    pub started_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
}

impl SessionAuditEntry {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

// ── Security audit ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventType {
    OtcIssued,
    OtcFailure,
    LoginSuccess,
    LoginFailure,
    AccountLocked,
    AccountUnlocked,
    SuspiciousActivity,
    RateLimitViolation,
    RiskPattern,
    SessionRevoked,
}

/// Append-only audit record. Identifiers are masked before they get here.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub user_id: Option<UserId>,
    pub identifier: Option<String>,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            event_type,
            severity,
            user_id: None,
            identifier: None,
            description: description.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attach an identifier; stored masked.
    pub fn identifier(mut self, identifier: &str) -> Self {
        self.identifier = Some(ridepool_domain::channel::mask_identifier(identifier));
        self
    }
}
