use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use ridepool_domain::device::DeviceInfo;

use crate::domain::types::SessionTokens;
use crate::error::AuthServiceError;
use crate::handlers::extract::ClientContext;
use crate::state::AppState;
use crate::usecase::account::{
    CodePurpose, CodeRequested, RequestCodeInput, RequestCodeUseCase, VerifyCodeInput,
    VerifyCodeUseCase,
};

#[derive(Deserialize)]
pub struct RequestCodeRequest {
    pub phone_number: String,
}

async fn request_code(
    state: &AppState,
    phone: String,
    purpose: CodePurpose,
) -> Result<(StatusCode, Json<CodeRequested>), AuthServiceError> {
    let usecase = RequestCodeUseCase {
        limiter: state.rate_limiter(),
        lockout: state.lockout_guard(),
        otc: state.otc_manager(),
        accounts: state.accounts.clone(),
        messages: state.messages.clone(),
        default_country_code: state.config.default_country_code.clone(),
    };
    let out = usecase.execute(RequestCodeInput { phone, purpose }).await?;
    Ok((StatusCode::ACCEPTED, Json(out)))
}

// ── POST /auth/register ──────────────────────────────────────────────────────

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RequestCodeRequest>,
) -> Result<(StatusCode, Json<CodeRequested>), AuthServiceError> {
    request_code(&state, body.phone_number, CodePurpose::Register).await
}

// ── POST /auth/login ─────────────────────────────────────────────────────────

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<RequestCodeRequest>,
) -> Result<(StatusCode, Json<CodeRequested>), AuthServiceError> {
    request_code(&state, body.phone_number, CodePurpose::Login).await
}

// ── POST /auth/otc/verify ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyCodeRequest {
    pub phone_number: String,
    pub code: String,
    #[serde(default)]
    pub device: DeviceInfo,
}

pub async fn verify_code(
    State(state): State<AppState>,
    client: ClientContext,
    Json(body): Json<VerifyCodeRequest>,
) -> Result<(StatusCode, Json<SessionTokens>), AuthServiceError> {
    let mut device = body.device;
    device.user_agent = device.user_agent.or(client.user_agent);
    device.ip_address = device.ip_address.or(client.source_address.clone());

    let usecase = VerifyCodeUseCase {
        lockout: state.lockout_guard(),
        otc: state.otc_manager(),
        sessions: state.session_manager(),
        accounts: state.accounts.clone(),
        audit: state.audit.clone(),
        risk: state.risk.clone(),
        default_country_code: state.config.default_country_code.clone(),
    };
    let tokens = usecase
        .execute(VerifyCodeInput {
            phone: body.phone_number,
            code: body.code,
            device,
            source_address: client.source_address,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}
