use chrono::{DateTime, Utc};

use ridepool_domain::id::{SessionId, UserId};

use crate::domain::keys;
use crate::domain::repository::{EphemeralStore, SessionAudit};
use crate::domain::types::{EndReason, SessionAuditEntry};
use crate::error::AuthServiceError;

/// Mirror entries outlive the sessions they describe by this long.
pub const RETENTION_SECS: u64 = 90 * 24 * 60 * 60;

/// [`SessionAudit`] kept in the ephemeral store with a long retention.
#[derive(Clone)]
pub struct StoreSessionAudit<S: EphemeralStore> {
    pub store: S,
}

impl<S: EphemeralStore> StoreSessionAudit<S> {
    async fn load(&self, session_id: SessionId) -> Result<Option<SessionAuditEntry>, AuthServiceError> {
        let Some(json) = self.store.get(&keys::session_audit(session_id)).await? else {
            return Ok(None);
        };
        let entry =
            serde_json::from_str(&json).map_err(|e| AuthServiceError::Internal(e.into()))?;
        Ok(Some(entry))
    }

    async fn put(&self, entry: &SessionAuditEntry) -> Result<(), AuthServiceError> {
        let json = serde_json::to_string(entry).map_err(|e| AuthServiceError::Internal(e.into()))?;
        self.store
            .set_ex(&keys::session_audit(entry.session_id), &json, RETENTION_SECS)
            .await?;
        Ok(())
    }
}

impl<S: EphemeralStore + Sync> SessionAudit for StoreSessionAudit<S> {
    async fn started(&self, entry: &SessionAuditEntry) -> Result<(), AuthServiceError> {
        self.put(entry).await?;
        let by_user = keys::session_audit_by_user(entry.user_id);
        let member = entry.session_id.to_string();
        self.store.sadd(&by_user, &member).await?;
        self.store.expire(&by_user, RETENTION_SECS).await?;
        self.store.sadd(keys::SESSION_AUDIT_ACTIVE, &member).await?;
        Ok(())
    }

    async fn touched(&self, session_id: SessionId, at: DateTime<Utc>) -> Result<(), AuthServiceError> {
        let Some(mut entry) = self.load(session_id).await? else {
            return Ok(());
        };
        if entry.is_active() {
            entry.last_access_at = at;
            self.put(&entry).await?;
        }
        Ok(())
    }

    async fn ended(
        &self,
        session_id: SessionId,
        reason: EndReason,
        at: DateTime<Utc>,
    ) -> Result<(), AuthServiceError> {
        self.store
            .srem(keys::SESSION_AUDIT_ACTIVE, &session_id.to_string())
            .await?;
        let Some(mut entry) = self.load(session_id).await? else {
            return Ok(());
        };
        if entry.is_active() {
            entry.ended_at = Some(at);
            entry.end_reason = Some(reason);
            self.put(&entry).await?;
        }
        Ok(())
    }

    async fn history(&self, user_id: UserId) -> Result<Vec<SessionAuditEntry>, AuthServiceError> {
        let by_user = keys::session_audit_by_user(user_id);
        let mut entries = Vec::new();
        for member in self.store.smembers(&by_user).await? {
            let Ok(session_id) = member.parse::<SessionId>() else {
                continue;
            };
            match self.load(session_id).await? {
                Some(entry) => entries.push(entry),
                None => self.store.srem(&by_user, &member).await?,
            }
        }
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(entries)
    }

    async fn active(&self) -> Result<Vec<SessionId>, AuthServiceError> {
        let members = self.store.smembers(keys::SESSION_AUDIT_ACTIVE).await?;
        Ok(members.iter().filter_map(|m| m.parse().ok()).collect())
    }
}
