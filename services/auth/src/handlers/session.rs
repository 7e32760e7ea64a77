use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use ridepool_domain::device::DeviceInfo;
use ridepool_domain::id::SessionId;

use crate::domain::types::{EndReason, Session, SessionAuditEntry};
use crate::error::AuthServiceError;
use crate::handlers::extract::Authenticated;
use crate::state::AppState;

/// Session as shown to its owner; token ids stay server-side.
#[derive(Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub device: DeviceInfo,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub current: bool,
}

impl SessionView {
    fn new(session: Session, current: SessionId) -> Self {
        Self {
            current: session.session_id == current,
            session_id: session.session_id,
            device: session.device,
            created_at: session.created_at,
            last_access_at: session.last_access_at,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Serialize)]
pub struct RevokedResponse {
    pub revoked: usize,
}

// ── GET /auth/sessions ───────────────────────────────────────────────────────

pub async fn list_sessions(
    State(state): State<AppState>,
    Authenticated(info): Authenticated,
) -> Result<Json<Vec<SessionView>>, AuthServiceError> {
    let sessions = state.session_manager().get_user_sessions(info.user_id).await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionView::new(s, info.session_id))
            .collect(),
    ))
}

// ── DELETE /auth/sessions ────────────────────────────────────────────────────

/// Log out everywhere, including the calling session.
pub async fn revoke_all_sessions(
    State(state): State<AppState>,
    Authenticated(info): Authenticated,
) -> Result<Json<RevokedResponse>, AuthServiceError> {
    let revoked = state
        .session_manager()
        .revoke_all_sessions(info.user_id, EndReason::UserLogout)
        .await?;
    Ok(Json(RevokedResponse { revoked }))
}

// ── GET /auth/sessions/history ───────────────────────────────────────────────

pub async fn session_history(
    State(state): State<AppState>,
    Authenticated(info): Authenticated,
) -> Result<Json<Vec<SessionAuditEntry>>, AuthServiceError> {
    let history = state.session_manager().get_session_history(info.user_id).await?;
    Ok(Json(history))
}

// ── DELETE /auth/sessions/devices/{device_id} ────────────────────────────────

pub async fn revoke_device_sessions(
    State(state): State<AppState>,
    Authenticated(info): Authenticated,
    Path(device_id): Path<String>,
) -> Result<(StatusCode, Json<RevokedResponse>), AuthServiceError> {
    let revoked = state
        .session_manager()
        .revoke_device_sessions(info.user_id, &device_id)
        .await?;
    let status = if revoked == 0 {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    Ok((status, Json(RevokedResponse { revoked })))
}
