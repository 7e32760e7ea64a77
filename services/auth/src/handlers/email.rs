use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use ridepool_domain::account::AccountStatus;

use crate::error::AuthServiceError;
use crate::handlers::extract::Authenticated;
use crate::infra::accounts::HttpAccountPort;
use crate::infra::audit::ChannelAuditLog;
use crate::infra::cache::RedisStore;
use crate::infra::delivery::WebhookMessageSender;
use crate::state::AppState;
use crate::usecase::account::{CodeRequested, EmailVerificationUseCase};

fn usecase(
    state: &AppState,
) -> EmailVerificationUseCase<RedisStore, ChannelAuditLog, HttpAccountPort, WebhookMessageSender> {
    EmailVerificationUseCase {
        lockout: state.lockout_guard(),
        otc: state.otc_manager(),
        accounts: state.accounts.clone(),
        messages: state.messages.clone(),
    }
}

// ── POST /auth/email ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RequestEmailCodeRequest {
    pub email: String,
}

pub async fn request_email_code(
    State(state): State<AppState>,
    Authenticated(info): Authenticated,
    Json(body): Json<RequestEmailCodeRequest>,
) -> Result<(StatusCode, Json<CodeRequested>), AuthServiceError> {
    let out = usecase(&state).request(info.user_id, &body.email).await?;
    Ok((StatusCode::ACCEPTED, Json(out)))
}

// ── POST /auth/email/verify ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConfirmEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct ConfirmEmailResponse {
    pub email_verified: bool,
    pub account_status: AccountStatus,
    /// Permissions in the current access token are stale until the next refresh.
    pub refresh_required: bool,
}

pub async fn confirm_email(
    State(state): State<AppState>,
    Authenticated(info): Authenticated,
    Json(body): Json<ConfirmEmailRequest>,
) -> Result<Json<ConfirmEmailResponse>, AuthServiceError> {
    let account = usecase(&state)
        .confirm(info.user_id, &body.email, &body.code)
        .await?;
    Ok(Json(ConfirmEmailResponse {
        email_verified: account.flags.email_verified,
        account_status: account.status,
        refresh_required: true,
    }))
}
