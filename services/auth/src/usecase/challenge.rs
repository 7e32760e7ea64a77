use chrono::Utc;
use uuid::Uuid;

use crate::domain::keys;
use crate::domain::repository::EphemeralStore;
use crate::domain::types::Challenge;
use crate::error::AuthServiceError;

const CHALLENGE_TTL_SECS: u64 = 10 * 60;
const BYPASS_TTL_SECS: u64 = 5 * 60;

/// Bookkeeping for human-verification challenges.
///
/// Solving the challenge is the client's business with a third-party provider; a trusted
/// caller reports completion through [`complete`](Self::complete), which grants a short bypass.
pub struct ChallengeBook<S: EphemeralStore> {
    pub store: S,
}

impl<S: EphemeralStore> ChallengeBook<S> {
    pub async fn issue(&self, identifier: &str) -> Result<Challenge, AuthServiceError> {
        let challenge = Challenge {
            challenge_id: Uuid::new_v4(),
            identifier: identifier.to_owned(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&challenge).map_err(|e| AuthServiceError::Internal(e.into()))?;
        self.store
            .set_ex(&keys::challenge(challenge.challenge_id), &json, CHALLENGE_TTL_SECS)
            .await?;
        Ok(challenge)
    }

    /// Consume a pending challenge and grant its identifier a bypass.
    /// Returns `false` if the challenge is unknown or expired.
    pub async fn complete(&self, challenge_id: Uuid) -> Result<bool, AuthServiceError> {
        let key = keys::challenge(challenge_id);
        let Some(json) = self.store.get(&key).await? else {
            return Ok(false);
        };
        let challenge: Challenge =
            serde_json::from_str(&json).map_err(|e| AuthServiceError::Internal(e.into()))?;
        self.store.del(&key).await?;
        self.store
            .set_ex(&keys::challenge_bypass(&challenge.identifier), "1", BYPASS_TTL_SECS)
            .await?;
        Ok(true)
    }

    pub async fn has_bypass(&self, identifier: &str) -> Result<bool, AuthServiceError> {
        Ok(self.store.exists(&keys::challenge_bypass(identifier)).await?)
    }
}
