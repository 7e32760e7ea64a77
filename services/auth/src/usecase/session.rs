use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ridepool_auth_types::token::{SessionClaims, TokenInfo, TokenKind, decode_token, encode_token};
use ridepool_domain::account::derive_permissions;
use ridepool_domain::device::DeviceInfo;
use ridepool_domain::id::{SessionId, UserId};

use crate::domain::keys;
use crate::domain::repository::{EphemeralStore, SessionAudit};
use crate::domain::types::{
    Account, EndReason, Session, SessionAuditEntry, SessionTokens, TokenPolicy,
};
use crate::error::AuthServiceError;

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

/// Whole seconds left until `at`, or `None` once it has passed.
fn secs_until(at: DateTime<Utc>, now: DateTime<Utc>) -> Option<u64> {
    u64::try_from((at - now).num_seconds()).ok().filter(|&s| s > 0)
}

/// Issues, validates, refreshes and revokes session tokens.
///
/// A session lives in the store under its id with TTL equal to the refresh-token lifetime.
/// Revocation writes both of the session's token ids to the denylist, each expiring with
/// the token it blocks. A token whose session record is gone no longer validates.
pub struct SessionManager<S: EphemeralStore, A: SessionAudit> {
    pub store: S,
    pub mirror: A,
    pub policy: TokenPolicy,
}

impl<S: EphemeralStore, A: SessionAudit> SessionManager<S, A> {
    pub async fn create_session(
        &self,
        account: &Account,
        device: DeviceInfo,
    ) -> Result<SessionTokens, AuthServiceError> {
        self.enforce_session_cap(account.id).await?;

        let now = Utc::now();
        let session = Session {
            session_id: SessionId::new(),
            user_id: account.id,
            device,
            flags: account.flags,
            account_status: account.status,
            permissions: derive_permissions(account.flags, account.status),
            created_at: now,
            last_access_at: now,
            expires_at: now + seconds(self.policy.refresh_ttl_secs),
            refresh_token_id: Uuid::new_v4(),
            access_token_id: Uuid::new_v4(),
            access_expires_at: now + seconds(self.policy.access_ttl_secs),
        };
        let access_token = self.mint(&session, TokenKind::Access, now)?;
        let refresh_token = self.mint(&session, TokenKind::Refresh, now)?;

        self.save(&session).await?;
        let index = keys::user_sessions(account.id);
        self.store
            .sadd(&index, &session.session_id.to_string())
            .await?;
        self.store.expire(&index, self.policy.refresh_ttl_secs).await?;

        let entry = SessionAuditEntry {
            session_id: session.session_id,
            user_id: session.user_id,
            device: session.device.clone(),
            started_at: now,
            last_access_at: now,
            ended_at: None,
            end_reason: None,
        };
        if let Err(e) = self.mirror.started(&entry).await {
            warn!(error = %e, session_id = %session.session_id, "session mirror write failed");
        }
        info!(user_id = %account.id, session_id = %session.session_id, "session created");

        Ok(Self::tokens(&session, access_token, refresh_token))
    }

    /// Verify signature, expiry, issuer, the denylist and that the session still exists.
    ///
    /// Records the access on the session; the mirror update is best-effort.
    pub async fn validate_token(&self, token: &str) -> Result<TokenInfo, AuthServiceError> {
        let info = decode_token(token, &self.policy.secret, &self.policy.issuer)?;
        if self.is_revoked(info.token_id).await? {
            return Err(AuthServiceError::TokenRevoked);
        }
        if !self.touch(info.session_id).await? {
            return Err(AuthServiceError::SessionNotFound);
        }
        Ok(info)
    }

    /// Mint a new access token from the account's current state. The refresh token is
    /// returned unchanged; the access token it replaces is denylisted.
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        account: &Account,
    ) -> Result<SessionTokens, AuthServiceError> {
        let info = decode_token(refresh_token, &self.policy.secret, &self.policy.issuer)?;
        if info.kind != TokenKind::Refresh {
            return Err(AuthServiceError::InvalidTokenType);
        }
        if self.is_revoked(info.token_id).await? {
            return Err(AuthServiceError::TokenRevoked);
        }
        let mut session = self
            .load(info.session_id)
            .await?
            .filter(|s| s.refresh_token_id == info.token_id)
            .ok_or(AuthServiceError::SessionNotFound)?;
        if session.user_id != account.id {
            return Err(AuthServiceError::Forbidden);
        }

        let now = Utc::now();
        let (previous_id, previous_expires_at) =
            (session.access_token_id, session.access_expires_at);
        session.flags = account.flags;
        session.account_status = account.status;
        session.permissions = derive_permissions(account.flags, account.status);
        session.last_access_at = now;
        session.access_token_id = Uuid::new_v4();
        session.access_expires_at = now + seconds(self.policy.access_ttl_secs);
        let access_token = self.mint(&session, TokenKind::Access, now)?;
        if !self.rewrite(&session).await? {
            return Err(AuthServiceError::SessionNotFound);
        }
        self.deny(previous_id, &session, json!("SUPERSEDED"), previous_expires_at, now)
            .await?;

        debug!(session_id = %session.session_id, "session refreshed");
        Ok(Self::tokens(&session, access_token, refresh_token.to_owned()))
    }

    /// Returns `false` if the session was already gone.
    pub async fn revoke_session(
        &self,
        session_id: SessionId,
        reason: EndReason,
    ) -> Result<bool, AuthServiceError> {
        let Some(session) = self.load(session_id).await? else {
            return Ok(false);
        };
        self.revoke(&session, reason).await?;
        Ok(true)
    }

    /// Returns how many sessions were revoked.
    pub async fn revoke_all_sessions(
        &self,
        user_id: UserId,
        reason: EndReason,
    ) -> Result<usize, AuthServiceError> {
        let sessions = self.get_user_sessions(user_id).await?;
        for session in &sessions {
            self.revoke(session, reason).await?;
        }
        Ok(sessions.len())
    }

    pub async fn revoke_device_sessions(
        &self,
        user_id: UserId,
        device_id: &str,
    ) -> Result<usize, AuthServiceError> {
        let mut revoked = 0;
        for session in self.get_user_sessions(user_id).await? {
            if session.device.device_id.as_deref() == Some(device_id) {
                self.revoke(&session, EndReason::DeviceRevoked).await?;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    /// Live sessions, most recently used first. Index entries whose session expired are pruned.
    pub async fn get_user_sessions(&self, user_id: UserId) -> Result<Vec<Session>, AuthServiceError> {
        let index = keys::user_sessions(user_id);
        let mut sessions = Vec::new();
        for member in self.store.smembers(&index).await? {
            let live = match member.parse::<SessionId>() {
                Ok(id) => self.load(id).await?,
                Err(_) => None,
            };
            match live {
                Some(session) => sessions.push(session),
                None => self.store.srem(&index, &member).await?,
            }
        }
        sessions.sort_by(|a, b| b.last_access_at.cmp(&a.last_access_at));
        Ok(sessions)
    }

    pub async fn get_active_session_count(&self, user_id: UserId) -> Result<usize, AuthServiceError> {
        Ok(self.get_user_sessions(user_id).await?.len())
    }

    pub async fn get_session_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<SessionAuditEntry>, AuthServiceError> {
        self.mirror.history(user_id).await
    }

    pub async fn is_session_active(&self, session_id: SessionId) -> Result<bool, AuthServiceError> {
        Ok(self.store.exists(&keys::session(session_id)).await?)
    }

    /// Close mirror entries whose live session expired on its own. Returns how many were closed.
    pub async fn sweep_expired(&self) -> Result<usize, AuthServiceError> {
        let now = Utc::now();
        let mut closed = 0;
        for session_id in self.mirror.active().await? {
            if !self.is_session_active(session_id).await? {
                self.mirror.ended(session_id, EndReason::Expired, now).await?;
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `every` until the task is aborted.
    pub fn spawn_sweeper(self, every: StdDuration) -> JoinHandle<()>
    where
        S: Send + Sync + 'static,
        A: Send + Sync + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match self.sweep_expired().await {
                    Ok(0) => {}
                    Ok(closed) => info!(closed, "expired sessions closed"),
                    Err(e) => warn!(error = %e, "session sweep failed"),
                }
            }
        })
    }

    async fn enforce_session_cap(&self, user_id: UserId) -> Result<(), AuthServiceError> {
        let cap = self.policy.max_concurrent_sessions;
        if cap == 0 {
            return Ok(());
        }
        let sessions = self.get_user_sessions(user_id).await?;
        // Oldest last; keep room for the session about to be created.
        for session in sessions.iter().skip(cap.saturating_sub(1)) {
            self.revoke(session, EndReason::SessionLimit).await?;
        }
        Ok(())
    }

    async fn revoke(&self, session: &Session, reason: EndReason) -> Result<(), AuthServiceError> {
        let now = Utc::now();
        self.deny(session.refresh_token_id, session, json!(reason), session.expires_at, now)
            .await?;
        self.deny(session.access_token_id, session, json!(reason), session.access_expires_at, now)
            .await?;
        self.store.del(&keys::session(session.session_id)).await?;
        self.store
            .srem(
                &keys::user_sessions(session.user_id),
                &session.session_id.to_string(),
            )
            .await?;
        if let Err(e) = self.mirror.ended(session.session_id, reason, now).await {
            warn!(error = %e, session_id = %session.session_id, "session mirror write failed");
        }
        info!(
            user_id = %session.user_id,
            session_id = %session.session_id,
            ?reason,
            "session revoked"
        );
        Ok(())
    }

    /// Denylist a token id until the token would have expired anyway.
    async fn deny(
        &self,
        token_id: Uuid,
        session: &Session,
        reason: Value,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AuthServiceError> {
        let Some(ttl) = secs_until(expires_at, now) else {
            return Ok(());
        };
        let entry = json!({
            "user_id": session.user_id,
            "session_id": session.session_id,
            "reason": reason,
            "revoked_at": now,
        });
        self.store
            .set_ex(&keys::revoked_token(token_id), &entry.to_string(), ttl)
            .await?;
        Ok(())
    }

    async fn is_revoked(&self, token_id: Uuid) -> Result<bool, AuthServiceError> {
        Ok(self.store.exists(&keys::revoked_token(token_id)).await?)
    }

    /// Returns `false` if the session is gone. A session deleted in the meantime stays deleted.
    async fn touch(&self, session_id: SessionId) -> Result<bool, AuthServiceError> {
        let Some(mut session) = self.load(session_id).await? else {
            return Ok(false);
        };
        let now = Utc::now();
        session.last_access_at = now;
        if !self.rewrite(&session).await? {
            return Ok(false);
        }
        if let Err(e) = self.mirror.touched(session_id, now).await {
            debug!(error = %e, session_id = %session_id, "session mirror touch failed");
        }
        Ok(true)
    }

    async fn load(&self, session_id: SessionId) -> Result<Option<Session>, AuthServiceError> {
        let Some(json) = self.store.get(&keys::session(session_id)).await? else {
            return Ok(None);
        };
        let session =
            serde_json::from_str(&json).map_err(|e| AuthServiceError::Internal(e.into()))?;
        Ok(Some(session))
    }

    /// Persist a new session with the TTL of its refresh token.
    async fn save(&self, session: &Session) -> Result<(), AuthServiceError> {
        let ttl = secs_until(session.expires_at, Utc::now()).unwrap_or(1);
        let json =
            serde_json::to_string(session).map_err(|e| AuthServiceError::Internal(e.into()))?;
        self.store
            .set_ex(&keys::session(session.session_id), &json, ttl)
            .await?;
        Ok(())
    }

    /// Overwrite a session only while its record still exists. Returns `false` if it is gone
    /// or out of time.
    async fn rewrite(&self, session: &Session) -> Result<bool, AuthServiceError> {
        let Some(ttl) = secs_until(session.expires_at, Utc::now()) else {
            return Ok(false);
        };
        let json =
            serde_json::to_string(session).map_err(|e| AuthServiceError::Internal(e.into()))?;
        Ok(self
            .store
            .set_xx_ex(&keys::session(session.session_id), &json, ttl)
            .await?)
    }

    fn mint(
        &self,
        session: &Session,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, AuthServiceError> {
        let (jti, exp) = match kind {
            TokenKind::Access => (session.access_token_id, session.access_expires_at),
            TokenKind::Refresh => (session.refresh_token_id, session.expires_at),
        };
        let claims = SessionClaims {
            sub: session.user_id.to_string(),
            sid: session.session_id.to_string(),
            jti: jti.to_string(),
            typ: kind,
            iss: self.policy.issuer.clone(),
            iat: u64::try_from(now.timestamp()).unwrap_or(0),
            exp: u64::try_from(exp.timestamp()).unwrap_or(0),
            mobile_verified: session.flags.mobile_verified,
            email_verified: session.flags.email_verified,
            account_status: session.account_status,
            permissions: session.permissions.clone(),
        };
        encode_token(&claims, &self.policy.secret).map_err(|e| AuthServiceError::Internal(e.into()))
    }

    fn tokens(session: &Session, access_token: String, refresh_token: String) -> SessionTokens {
        SessionTokens {
            user_id: session.user_id,
            session_id: session.session_id,
            access_token,
            refresh_token,
            access_expires_at: session.access_expires_at,
            refresh_expires_at: session.expires_at,
            permissions: session.permissions.clone(),
        }
    }
}
