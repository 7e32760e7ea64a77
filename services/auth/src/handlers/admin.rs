use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ridepool_auth_types::guard::ensure_verified;
use ridepool_domain::account::VerificationRequirement;
use ridepool_domain::channel::Channel;
use ridepool_domain::id::UserId;

use crate::domain::types::{LockoutStatus, RateLimitStatus, RiskAssessment};
use crate::error::AuthServiceError;
use crate::handlers::extract::{AdminKey, Authenticated};
use crate::state::AppState;

/// Normalize an identifier the way the login flows store it.
fn normalize(state: &AppState, raw: &str) -> Result<String, AuthServiceError> {
    let channel = if raw.contains('@') {
        Channel::email(raw)?
    } else {
        Channel::phone(raw, &state.config.default_country_code)?
    };
    Ok(channel.address().to_owned())
}

#[derive(Deserialize)]
pub struct IdentifierRequest {
    pub identifier: String,
}

// ── POST /security/challenge/check ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct ChallengeCheckRequest {
    pub identifier: String,
    pub source_address: Option<String>,
}

#[derive(Serialize)]
pub struct ChallengeCheckResponse {
    pub required: bool,
    pub challenge_id: Option<Uuid>,
}

pub async fn check_challenge(
    State(state): State<AppState>,
    _admin: AdminKey,
    Json(body): Json<ChallengeCheckRequest>,
) -> Result<Json<ChallengeCheckResponse>, AuthServiceError> {
    let identifier = normalize(&state, &body.identifier)?;
    let book = state.challenge_book();
    let required = !book.has_bypass(&identifier).await?
        && state
            .lockout_guard()
            .should_require_challenge(&identifier, body.source_address.as_deref())
            .await;
    let challenge_id = if required {
        Some(book.issue(&identifier).await?.challenge_id)
    } else {
        None
    };
    Ok(Json(ChallengeCheckResponse {
        required,
        challenge_id,
    }))
}

// ── POST /security/challenge/complete ────────────────────────────────────────

#[derive(Deserialize)]
pub struct ChallengeCompleteRequest {
    pub challenge_id: Uuid,
}

pub async fn complete_challenge(
    State(state): State<AppState>,
    _admin: AdminKey,
    Json(body): Json<ChallengeCompleteRequest>,
) -> Result<StatusCode, AuthServiceError> {
    if state.challenge_book().complete(body.challenge_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AuthServiceError::Validation(
            "unknown or expired challenge".to_owned(),
        ))
    }
}

// ── GET /security/lockout/{identifier} ───────────────────────────────────────

pub async fn lockout_status(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(identifier): Path<String>,
) -> Result<Json<LockoutStatus>, AuthServiceError> {
    let identifier = normalize(&state, &identifier)?;
    Ok(Json(state.lockout_guard().status(&identifier).await?))
}

// ── POST /security/admin/unlock ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct UnlockResponse {
    pub unlocked: bool,
}

pub async fn unlock(
    State(state): State<AppState>,
    _admin: AdminKey,
    Json(body): Json<IdentifierRequest>,
) -> Result<Json<UnlockResponse>, AuthServiceError> {
    let identifier = normalize(&state, &body.identifier)?;
    let unlocked = state.lockout_guard().unlock(&identifier).await?;
    Ok(Json(UnlockResponse { unlocked }))
}

// ── POST /security/admin/reset-rate-limit ────────────────────────────────────

pub async fn reset_rate_limit(
    State(state): State<AppState>,
    _admin: AdminKey,
    Json(body): Json<IdentifierRequest>,
) -> Result<StatusCode, AuthServiceError> {
    let identifier = normalize(&state, &body.identifier)?;
    state.rate_limiter().reset(&identifier).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── GET /security/rate-limit/{identifier} ────────────────────────────────────

pub async fn rate_limit_status(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(identifier): Path<String>,
) -> Result<Json<Vec<RateLimitStatus>>, AuthServiceError> {
    let identifier = normalize(&state, &identifier)?;
    Ok(Json(state.rate_limiter().status(&identifier).await?))
}

// ── GET /security/risk/{user_id} ─────────────────────────────────────────────

pub async fn risk_assessment(
    State(state): State<AppState>,
    _admin: AdminKey,
    Authenticated(caller): Authenticated,
    Path(user_id): Path<UserId>,
) -> Result<Json<RiskAssessment>, AuthServiceError> {
    ensure_verified(VerificationRequirement::Full, caller.flags)?;
    Ok(Json(state.risk_scorer().assessment(user_id).await?))
}
