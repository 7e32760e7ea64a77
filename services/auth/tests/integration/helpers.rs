use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};

use ridepool_auth::domain::repository::{
    AccountPort, AuditLog, EphemeralStore, MessageSender, SessionAudit,
};
use ridepool_auth::domain::types::{
    Account, AuthEvent, EndReason, LockoutPolicy, OtcPolicy, PatternPolicy, RateLimitPolicy,
    SecurityEvent, SecurityEventType, SessionAuditEntry, TokenPolicy,
};
use ridepool_auth::error::{AuthServiceError, StoreError};
use ridepool_auth::infra::session_audit::StoreSessionAudit;
use ridepool_auth::usecase::lockout::LockoutGuard;
use ridepool_auth::usecase::otc::OtcManager;
use ridepool_auth::usecase::rate_limit::RateLimiter;
use ridepool_auth::usecase::risk::PatternRiskScorer;
use ridepool_auth::usecase::session::SessionManager;
use ridepool_domain::account::{AccountStatus, VerificationFlags};
use ridepool_domain::channel::Channel;
use ridepool_domain::id::{SessionId, UserId};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_ISSUER: &str = "ridepool-test";
pub const TEST_PEPPER: &str = "test-pepper";
pub const TEST_PHONE: &str = "+15551234567";

// ── MockStore ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    ttl: Option<u64>,
}

/// In-memory store. TTLs are recorded, not enforced; use [`MockStore::expire_now`] to
/// simulate a key running out.
#[derive(Clone, Default)]
pub struct MockStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    down: Arc<AtomicBool>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn expire_now(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.entries.lock().unwrap().get(key).and_then(|e| e.ttl)
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        match self.entries.lock().unwrap().get(key).map(|e| &e.value) {
            Some(Value::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn smembers_of(&self, key: &str) -> Vec<String> {
        match self.entries.lock().unwrap().get(key).map(|e| &e.value) {
            Some(Value::Set(set)) => set.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn add(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_owned()).or_insert(Entry {
            value: Value::Str("0".to_owned()),
            ttl: None,
        });
        let Value::Str(current) = &entry.value else {
            return Err(StoreError::Unavailable("WRONGTYPE".to_owned()));
        };
        let next = current.parse::<i64>().unwrap_or(0) + delta;
        entry.value = Value::Str(next.to_string());
        Ok(next)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("mock store down".to_owned()));
        }
        Ok(())
    }
}

impl EphemeralStore for MockStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.raw(key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.check()?;
        self.entries.lock().unwrap().insert(
            key.to_owned(),
            Entry {
                value: Value::Str(value.to_owned()),
                ttl: Some(ttl_secs),
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value: Value::Str(value.to_owned()),
                ttl: Some(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn set_xx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        *entry = Entry {
            value: Value::Str(value.to_owned()),
            ttl: Some(ttl_secs),
        };
        Ok(true)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.add(key, 1)
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        self.add(key, -1)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        self.check()?;
        Ok(match self.entries.lock().unwrap().get_mut(key) {
            Some(entry) => {
                entry.ttl = Some(ttl_secs);
                true
            }
            None => false,
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.check()?;
        Ok(self.ttl_of(key))
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.entries.lock().unwrap().contains_key(key))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_owned()).or_insert(Entry {
            value: Value::Set(BTreeSet::new()),
            ttl: None,
        });
        if let Value::Set(set) = &mut entry.value {
            set.insert(member.to_owned());
        }
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let empty = match entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Set(set)) => {
                set.remove(member);
                set.is_empty()
            }
            _ => false,
        };
        if empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(match self.entries.lock().unwrap().get(key).map(|e| &e.value) {
            Some(Value::Set(set)) => set.iter().cloned().collect(),
            _ => Vec::new(),
        })
    }

    async fn scard(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.smembers(key).await?.len() as u64)
    }

    async fn lpush_trim(&self, key: &str, value: &str, keep: usize) -> Result<(), StoreError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_owned()).or_insert(Entry {
            value: Value::List(VecDeque::new()),
            ttl: None,
        });
        if let Value::List(list) = &mut entry.value {
            list.push_front(value.to_owned());
            list.truncate(keep);
        }
        Ok(())
    }

    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(match self.entries.lock().unwrap().get(key).map(|e| &e.value) {
            Some(Value::List(list)) => list.iter().take(count).cloned().collect(),
            _ => Vec::new(),
        })
    }
}

// ── MockAuditLog ─────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockAuditLog {
    pub events: Arc<Mutex<Vec<SecurityEvent>>>,
}

impl MockAuditLog {
    pub fn count(&self, event_type: SecurityEventType) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn last(&self, event_type: SecurityEventType) -> Option<SecurityEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.event_type == event_type)
            .cloned()
    }
}

impl AuditLog for MockAuditLog {
    fn record(&self, event: SecurityEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ── MockAccountPort ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockAccountPort {
    pub accounts: Arc<Mutex<Vec<Account>>>,
}

impl MockAccountPort {
    pub fn with(accounts: Vec<Account>) -> Self {
        Self {
            accounts: Arc::new(Mutex::new(accounts)),
        }
    }

    pub fn get(&self, id: UserId) -> Option<Account> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }
}

impl AccountPort for MockAccountPort {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Account>, AuthServiceError> {
        Ok(self.get(id))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>, AuthServiceError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.phone_number == phone)
            .cloned())
    }

    async fn create(&self, phone: &str) -> Result<Account, AuthServiceError> {
        let account = Account {
            id: UserId::new(),
            phone_number: phone.to_owned(),
            email: None,
            flags: VerificationFlags::default(),
            status: AccountStatus::PendingEmail,
        };
        self.accounts.lock().unwrap().push(account.clone());
        Ok(account)
    }

    async fn save(&self, account: &Account) -> Result<(), AuthServiceError> {
        let mut accounts = self.accounts.lock().unwrap();
        let slot = accounts
            .iter_mut()
            .find(|a| a.id == account.id)
            .ok_or(AuthServiceError::AccountNotFound)?;
        *slot = account.clone();
        Ok(())
    }
}

// ── MockMessageSender ────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockMessageSender {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
    pub failing: bool,
}

impl MockMessageSender {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// The numeric code in the last message sent to `address`.
    pub fn last_code(&self, address: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let (_, message) = sent.iter().rev().find(|(to, _)| to == address)?;
        message
            .split_whitespace()
            .map(|w| w.trim_end_matches('.'))
            .find(|w| w.len() >= 4 && w.bytes().all(|b| b.is_ascii_digit()))
            .map(str::to_owned)
    }
}

impl MessageSender for MockMessageSender {
    async fn send(&self, channel: &Channel, message: &str) -> Result<String, AuthServiceError> {
        if self.failing {
            return Err(anyhow::anyhow!("gateway down").into());
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.address().to_owned(), message.to_owned()));
        Ok("delivery-1".to_owned())
    }
}

// ── FailingSessionAudit ──────────────────────────────────────────────────────

/// Mirror whose every write fails; session operations must not care.
#[derive(Clone, Default)]
pub struct FailingSessionAudit;

impl SessionAudit for FailingSessionAudit {
    async fn started(&self, _entry: &SessionAuditEntry) -> Result<(), AuthServiceError> {
        Err(anyhow::anyhow!("mirror down").into())
    }

    async fn touched(
        &self,
        _session_id: SessionId,
        _at: chrono::DateTime<Utc>,
    ) -> Result<(), AuthServiceError> {
        Err(anyhow::anyhow!("mirror down").into())
    }

    async fn ended(
        &self,
        _session_id: SessionId,
        _reason: EndReason,
        _at: chrono::DateTime<Utc>,
    ) -> Result<(), AuthServiceError> {
        Err(anyhow::anyhow!("mirror down").into())
    }

    async fn history(&self, _user_id: UserId) -> Result<Vec<SessionAuditEntry>, AuthServiceError> {
        Err(anyhow::anyhow!("mirror down").into())
    }

    async fn active(&self) -> Result<Vec<SessionId>, AuthServiceError> {
        Err(anyhow::anyhow!("mirror down").into())
    }
}

// ── Builders ─────────────────────────────────────────────────────────────────

pub fn phone() -> Channel {
    Channel::phone(TEST_PHONE, "+1").unwrap()
}

pub fn account(flags: VerificationFlags, status: AccountStatus) -> Account {
    Account {
        id: UserId::new(),
        phone_number: TEST_PHONE.to_owned(),
        email: None,
        flags,
        status,
    }
}

pub fn mobile_verified_account() -> Account {
    account(
        VerificationFlags {
            mobile_verified: true,
            email_verified: false,
        },
        AccountStatus::PendingEmail,
    )
}

pub fn fully_verified_account() -> Account {
    Account {
        email: Some("rider@corp.example".to_owned()),
        ..account(
            VerificationFlags {
                mobile_verified: true,
                email_verified: true,
            },
            AccountStatus::Active,
        )
    }
}

pub fn otc_manager(store: &MockStore, audit: &MockAuditLog) -> OtcManager<MockStore, MockAuditLog> {
    OtcManager {
        store: store.clone(),
        audit: audit.clone(),
        policy: OtcPolicy::default(),
        pepper: TEST_PEPPER.to_owned(),
    }
}

pub fn rate_limiter(store: &MockStore) -> RateLimiter<MockStore> {
    RateLimiter {
        store: store.clone(),
        policy: RateLimitPolicy::default(),
    }
}

pub fn lockout_guard(store: &MockStore, audit: &MockAuditLog) -> LockoutGuard<MockStore, MockAuditLog> {
    LockoutGuard {
        store: store.clone(),
        audit: audit.clone(),
        policy: LockoutPolicy::default(),
    }
}

pub fn token_policy() -> TokenPolicy {
    TokenPolicy {
        secret: TEST_JWT_SECRET.to_owned(),
        issuer: TEST_ISSUER.to_owned(),
        access_ttl_secs: 3600,
        refresh_ttl_secs: 86400,
        max_concurrent_sessions: 5,
    }
}

pub fn session_manager(store: &MockStore) -> SessionManager<MockStore, StoreSessionAudit<MockStore>> {
    SessionManager {
        store: store.clone(),
        mirror: StoreSessionAudit {
            store: store.clone(),
        },
        policy: token_policy(),
    }
}

pub fn risk_scorer(store: &MockStore, audit: &MockAuditLog) -> PatternRiskScorer<MockStore, MockAuditLog> {
    PatternRiskScorer {
        store: store.clone(),
        audit: audit.clone(),
        lockout: lockout_guard(store, audit),
        policy: PatternPolicy::default(),
    }
}

/// Successful authentication at `hour:00` UTC on a fixed day.
pub fn auth_event(user_id: UserId, hour: u32, user_agent: &str, ip: &str) -> AuthEvent {
    AuthEvent {
        user_id,
        identifier: TEST_PHONE.to_owned(),
        source_address: Some(ip.to_owned()),
        user_agent: Some(user_agent.to_owned()),
        device_attributes: Default::default(),
        occurred_at: Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap(),
    }
}
