//! Store key namespace.
//!
//! Every key is `{purpose}:{identifier}[:{subtype}]`, so counters and histories
//! for the same identifier never collide. Build keys only through these helpers.

use uuid::Uuid;

use ridepool_domain::channel::Channel;
use ridepool_domain::id::{SessionId, UserId};

use crate::domain::types::RateLimitPurpose;

pub fn otc(channel: &Channel) -> String {
    format!("otc:{}", channel.key())
}

pub fn otc_attempts(channel: &Channel) -> String {
    format!("otc_attempts:{}", channel.key())
}

/// Claimed by the single verification allowed to consume a code.
pub fn otc_consumed(channel: &Channel, issue_id: Uuid) -> String {
    format!("otc_consumed:{}:{issue_id}", channel.key())
}

pub fn otc_issued(channel: &Channel) -> String {
    format!("otc_issued:{}", channel.key())
}

pub fn rate_limit(purpose: RateLimitPurpose, identifier: &str) -> String {
    format!("rate_limit:{}:{}", purpose.as_str(), identifier)
}

pub fn failed_attempts(identifier: &str) -> String {
    format!("failed_attempts:{identifier}")
}

pub fn ip_failed_attempts(ip: &str) -> String {
    format!("ip_failed_attempts:{ip}")
}

pub fn lockout(identifier: &str) -> String {
    format!("account_lockout:{identifier}")
}

pub fn suspicious(identifier: &str, activity: &str) -> String {
    format!("suspicious:{identifier}:{activity}")
}

pub fn challenge(challenge_id: Uuid) -> String {
    format!("challenge:{challenge_id}")
}

pub fn challenge_bypass(identifier: &str) -> String {
    format!("challenge_bypass:{identifier}")
}

pub fn login_hours(user_id: UserId) -> String {
    format!("time_pattern:{user_id}")
}

pub fn device_history(user_id: UserId) -> String {
    format!("device_history:{user_id}")
}

pub fn location_history(user_id: UserId) -> String {
    format!("location_history:{user_id}")
}

pub fn velocity(user_id: UserId) -> String {
    format!("velocity_check:{user_id}")
}

pub fn recent_attempts(user_id: UserId) -> String {
    format!("login_pattern:{user_id}")
}

pub fn session(session_id: SessionId) -> String {
    format!("session:{session_id}")
}

pub fn user_sessions(user_id: UserId) -> String {
    format!("user_sessions:{user_id}")
}

pub fn revoked_token(token_id: Uuid) -> String {
    format!("revoked_token:{token_id}")
}

pub fn session_audit(session_id: SessionId) -> String {
    format!("session_audit:{session_id}")
}

pub fn session_audit_by_user(user_id: UserId) -> String {
    format!("session_audit_user:{user_id}")
}

pub const SESSION_AUDIT_ACTIVE: &str = "session_audit_active:all";
