use std::sync::Arc;

use deadpool_redis::Pool as RedisPool;

use crate::config::AuthConfig;
use crate::infra::accounts::HttpAccountPort;
use crate::infra::audit::ChannelAuditLog;
use crate::infra::cache::RedisStore;
use crate::infra::delivery::WebhookMessageSender;
use crate::infra::session_audit::StoreSessionAudit;
use crate::usecase::challenge::ChallengeBook;
use crate::usecase::lockout::LockoutGuard;
use crate::usecase::otc::OtcManager;
use crate::usecase::rate_limit::RateLimiter;
use crate::usecase::risk::{PatternRiskScorer, RiskMonitor};
use crate::usecase::session::SessionManager;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub redis: RedisPool,
    pub config: Arc<AuthConfig>,
    pub accounts: HttpAccountPort,
    pub messages: WebhookMessageSender,
    pub audit: ChannelAuditLog,
    pub risk: RiskMonitor,
}

impl AppState {
    pub fn store(&self) -> RedisStore {
        RedisStore {
            pool: self.redis.clone(),
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter<RedisStore> {
        RateLimiter {
            store: self.store(),
            policy: self.config.rate_limit_policy(),
        }
    }

    pub fn lockout_guard(&self) -> LockoutGuard<RedisStore, ChannelAuditLog> {
        LockoutGuard {
            store: self.store(),
            audit: self.audit.clone(),
            policy: self.config.lockout_policy(),
        }
    }

    pub fn challenge_book(&self) -> ChallengeBook<RedisStore> {
        ChallengeBook {
            store: self.store(),
        }
    }

    pub fn otc_manager(&self) -> OtcManager<RedisStore, ChannelAuditLog> {
        OtcManager {
            store: self.store(),
            audit: self.audit.clone(),
            policy: self.config.otc_policy(),
            pepper: self.config.otc_pepper.clone(),
        }
    }

    pub fn session_manager(&self) -> SessionManager<RedisStore, StoreSessionAudit<RedisStore>> {
        SessionManager {
            store: self.store(),
            mirror: StoreSessionAudit {
                store: self.store(),
            },
            policy: self.config.token_policy(),
        }
    }

    pub fn risk_scorer(&self) -> PatternRiskScorer<RedisStore, ChannelAuditLog> {
        PatternRiskScorer {
            store: self.store(),
            audit: self.audit.clone(),
            lockout: self.lockout_guard(),
            policy: self.config.pattern_policy(),
        }
    }
}
