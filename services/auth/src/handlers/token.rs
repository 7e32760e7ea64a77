use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use ridepool_auth_types::guard::ensure_verified;
use ridepool_auth_types::token::TokenKind;
use ridepool_domain::account::{AccountStatus, Permission, VerificationRequirement};
use ridepool_domain::id::{SessionId, UserId};

use crate::domain::types::{EndReason, SessionTokens};
use crate::error::AuthServiceError;
use crate::handlers::extract::Authenticated;
use crate::state::AppState;
use crate::usecase::account::RefreshSessionUseCase;

// ── GET /auth/token ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CheckTokenQuery {
    pub require: Option<VerificationRequirement>,
}

#[derive(Serialize)]
pub struct CheckTokenResponse {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub mobile_verified: bool,
    pub email_verified: bool,
    pub account_status: AccountStatus,
    pub permissions: Vec<Permission>,
    pub expires_at: u64,
}

pub async fn check_token(
    Authenticated(info): Authenticated,
    Query(query): Query<CheckTokenQuery>,
) -> Result<Json<CheckTokenResponse>, AuthServiceError> {
    if info.kind != TokenKind::Access {
        return Err(AuthServiceError::InvalidTokenType);
    }
    if let Some(requirement) = query.require {
        ensure_verified(requirement, info.flags)?;
    }
    Ok(Json(CheckTokenResponse {
        user_id: info.user_id,
        session_id: info.session_id,
        mobile_verified: info.flags.mobile_verified,
        email_verified: info.flags.email_verified,
        account_status: info.account_status,
        permissions: info.permissions,
        expires_at: info.expires_at,
    }))
}

// ── POST /auth/token/refresh ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<(StatusCode, Json<SessionTokens>), AuthServiceError> {
    let usecase = RefreshSessionUseCase {
        sessions: state.session_manager(),
        accounts: state.accounts.clone(),
    };
    let tokens = usecase.execute(&body.refresh_token).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

// ── DELETE /auth/token ───────────────────────────────────────────────────────

/// Log out the session the presented token belongs to.
pub async fn revoke_token(
    State(state): State<AppState>,
    Authenticated(info): Authenticated,
) -> Result<StatusCode, AuthServiceError> {
    state
        .session_manager()
        .revoke_session(info.session_id, EndReason::UserLogout)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
