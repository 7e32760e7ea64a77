use serde::Deserialize;

use ridepool_core::config::Config;

use crate::domain::types::{
    DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_API_REQUESTS_PER_MINUTE,
    DEFAULT_DEVICE_CHANGE_THRESHOLD, DEFAULT_LOCATION_CHANGE_THRESHOLD,
    DEFAULT_LOCKOUT_DURATION_SECS, DEFAULT_LOGIN_ATTEMPTS_PER_HOUR,
    DEFAULT_MAX_CONCURRENT_SESSIONS, DEFAULT_MAX_FAILED_ATTEMPTS, DEFAULT_OTC_LENGTH,
    DEFAULT_OTC_MAX_ATTEMPTS, DEFAULT_OTC_REQUESTS_PER_HOUR, DEFAULT_OTC_TTL_SECS,
    DEFAULT_REFRESH_TOKEN_TTL_SECS, DEFAULT_SUSPICIOUS_THRESHOLD, DEFAULT_UNUSUAL_HOUR_THRESHOLD,
    LockoutPolicy, OtcPolicy, PatternPolicy, RateLimitPolicy, TokenPolicy,
};

/// Auth service configuration loaded from environment variables.
///
/// Each field is read from its upper-case name (`redis_url` ← `REDIS_URL`).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Redis connection URL.
    pub redis_url: String,
    /// HMAC secret for signing access and refresh tokens.
    pub jwt_secret: String,
    #[serde(default = "default_issuer")]
    pub jwt_issuer: String,
    /// Server-side pepper mixed into one-time code hashes.
    pub otc_pepper: String,
    /// Shared secret expected in `x-admin-key` on `/security/*` admin routes.
    pub admin_api_key: String,
    /// Accounts service base URL (e.g. "http://accounts:3000").
    pub accounts_url: String,
    /// Delivery webhook; codes are only logged (masked) when unset.
    #[serde(default)]
    pub delivery_url: Option<String>,
    /// Prepended to phone numbers submitted without an international prefix.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    /// TCP port to listen on (default 3112). Env var: `AUTH_PORT`.
    #[serde(default = "default_port")]
    pub auth_port: u16,

    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_concurrent_sessions: usize,

    #[serde(default = "default_otc_length")]
    pub otc_length: usize,
    #[serde(default = "default_otc_ttl")]
    pub otc_ttl_secs: u64,
    #[serde(default = "default_otc_max_attempts")]
    pub otc_max_attempts: u32,
    #[serde(default = "default_otc_per_hour")]
    pub otc_requests_per_hour: u32,

    #[serde(default = "default_login_per_hour")]
    pub login_attempts_per_hour: u32,
    #[serde(default = "default_api_per_minute")]
    pub api_requests_per_minute: u32,

    #[serde(default = "default_max_failed")]
    pub lockout_max_failed_attempts: u32,
    #[serde(default = "default_lockout_secs")]
    pub lockout_duration_secs: u64,
    #[serde(default = "default_suspicious")]
    pub suspicious_threshold: u32,

    #[serde(default = "default_true")]
    pub pattern_monitoring_enabled: bool,
    #[serde(default = "default_unusual_hour")]
    pub unusual_hour_threshold: u32,
    #[serde(default = "default_device_change")]
    pub device_change_threshold: u32,
    #[serde(default = "default_location_change")]
    pub location_change_threshold: u32,
    #[serde(default = "default_queue_capacity")]
    pub risk_queue_capacity: usize,
    /// Interval of the expired-session sweep.
    #[serde(default = "default_sweep_secs")]
    pub session_sweep_interval_secs: u64,
}

impl Config for AuthConfig {}

fn default_issuer() -> String {
    "ridepool".to_owned()
}
fn default_country_code() -> String {
    "+91".to_owned()
}
fn default_port() -> u16 {
    3112
}
fn default_access_ttl() -> u64 {
    DEFAULT_ACCESS_TOKEN_TTL_SECS
}
fn default_refresh_ttl() -> u64 {
    DEFAULT_REFRESH_TOKEN_TTL_SECS
}
fn default_max_sessions() -> usize {
    DEFAULT_MAX_CONCURRENT_SESSIONS
}
fn default_otc_length() -> usize {
    DEFAULT_OTC_LENGTH
}
fn default_otc_ttl() -> u64 {
    DEFAULT_OTC_TTL_SECS
}
fn default_otc_max_attempts() -> u32 {
    DEFAULT_OTC_MAX_ATTEMPTS
}
fn default_otc_per_hour() -> u32 {
    DEFAULT_OTC_REQUESTS_PER_HOUR
}
fn default_login_per_hour() -> u32 {
    DEFAULT_LOGIN_ATTEMPTS_PER_HOUR
}
fn default_api_per_minute() -> u32 {
    DEFAULT_API_REQUESTS_PER_MINUTE
}
fn default_max_failed() -> u32 {
    DEFAULT_MAX_FAILED_ATTEMPTS
}
fn default_lockout_secs() -> u64 {
    DEFAULT_LOCKOUT_DURATION_SECS
}
fn default_suspicious() -> u32 {
    DEFAULT_SUSPICIOUS_THRESHOLD
}
fn default_true() -> bool {
    true
}
fn default_unusual_hour() -> u32 {
    DEFAULT_UNUSUAL_HOUR_THRESHOLD
}
fn default_device_change() -> u32 {
    DEFAULT_DEVICE_CHANGE_THRESHOLD
}
fn default_location_change() -> u32 {
    DEFAULT_LOCATION_CHANGE_THRESHOLD
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_sweep_secs() -> u64 {
    3600
}

impl AuthConfig {
    pub fn otc_policy(&self) -> OtcPolicy {
        OtcPolicy {
            code_length: self.otc_length,
            ttl_secs: self.otc_ttl_secs,
            max_attempts: self.otc_max_attempts,
            max_issuances_per_hour: self.otc_requests_per_hour,
        }
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            otc_requests_per_hour: self.otc_requests_per_hour,
            login_attempts_per_hour: self.login_attempts_per_hour,
            api_requests_per_minute: self.api_requests_per_minute,
        }
    }

    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_failed_attempts: self.lockout_max_failed_attempts,
            lockout_duration_secs: self.lockout_duration_secs,
            suspicious_threshold: self.suspicious_threshold,
        }
    }

    pub fn pattern_policy(&self) -> PatternPolicy {
        PatternPolicy {
            enabled: self.pattern_monitoring_enabled,
            unusual_hour_threshold: self.unusual_hour_threshold,
            device_change_threshold: self.device_change_threshold,
            location_change_threshold: self.location_change_threshold,
        }
    }

    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            secret: self.jwt_secret.clone(),
            issuer: self.jwt_issuer.clone(),
            access_ttl_secs: self.access_token_ttl_secs,
            refresh_ttl_secs: self.refresh_token_ttl_secs,
            max_concurrent_sessions: self.max_concurrent_sessions,
        }
    }
}
