#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use ridepool_domain::channel::Channel;
use ridepool_domain::id::{SessionId, UserId};

use crate::domain::types::{Account, EndReason, SecurityEvent, SessionAuditEntry};
use crate::error::{AuthServiceError, StoreError};

/// Shared key-value store with per-key expiry.
///
/// Counters must go through [`incr`](LocalEphemeralStore::incr); callers never read-modify-write
/// a counter. TTLs are in seconds.
#[trait_variant::make(EphemeralStore: Send)]
pub trait LocalEphemeralStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Write only if the key is absent. Returns `true` if this call created it.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError>;

    /// Overwrite only if the key still exists. Returns `true` if the write happened.
    async fn set_xx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError>;

    /// Atomically increment and return the post-increment value (missing key counts as 0).
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Atomically decrement and return the post-decrement value.
    async fn decr(&self, key: &str) -> Result<i64, StoreError>;

    /// Set a TTL on an existing key. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError>;

    /// Remaining TTL in seconds; `None` if the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Returns `true` if a key was removed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn scard(&self, key: &str) -> Result<u64, StoreError>;

    /// Push to the head of a list and keep only the newest `keep` entries.
    async fn lpush_trim(&self, key: &str, value: &str, keep: usize) -> Result<(), StoreError>;

    /// Newest-first slice of at most `count` entries.
    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>, StoreError>;
}

/// Port for account state owned by the accounts service.
#[trait_variant::make(AccountPort: Send)]
pub trait LocalAccountPort {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Account>, AuthServiceError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>, AuthServiceError>;
    /// Create a pending account for a newly verified-to-be phone number.
    async fn create(&self, phone: &str) -> Result<Account, AuthServiceError>;
    async fn save(&self, account: &Account) -> Result<(), AuthServiceError>;
}

/// Out-of-band delivery of codes (SMS / email).
#[trait_variant::make(MessageSender: Send)]
pub trait LocalMessageSender {
    /// Returns a delivery id. Failures never roll back code issuance.
    async fn send(&self, channel: &Channel, message: &str) -> Result<String, AuthServiceError>;
}

/// Durable history of session lifecycles, written fire-and-forget.
#[trait_variant::make(SessionAudit: Send)]
pub trait LocalSessionAudit {
    async fn started(&self, entry: &SessionAuditEntry) -> Result<(), AuthServiceError>;
    async fn touched(&self, session_id: SessionId, at: DateTime<Utc>) -> Result<(), AuthServiceError>;
    async fn ended(
        &self,
        session_id: SessionId,
        reason: EndReason,
        at: DateTime<Utc>,
    ) -> Result<(), AuthServiceError>;
    /// All mirrored sessions for a user, newest first.
    async fn history(&self, user_id: UserId) -> Result<Vec<SessionAuditEntry>, AuthServiceError>;
    /// Sessions the mirror still considers active.
    async fn active(&self) -> Result<Vec<SessionId>, AuthServiceError>;
}

/// Append-only security event sink. Must never block the caller.
pub trait AuditLog: Clone + Send + Sync + 'static {
    fn record(&self, event: SecurityEvent);
}
