use axum::{
    Router,
    body::Body,
    http::{HeaderName, Request},
    routing::{delete, get, post},
};
use tower::ServiceBuilder;
use tower_http::request_id::PropagateRequestIdLayer;
use tower_http::trace::TraceLayer;
use tracing::{Span, info_span};

use ridepool_core::health::healthz;
use ridepool_core::middleware::{REQUEST_ID_HEADER, request_id_layer};

use crate::handlers::{
    admin::{
        check_challenge, complete_challenge, lockout_status, rate_limit_status, reset_rate_limit,
        risk_assessment, unlock,
    },
    email::{confirm_email, request_email_code},
    health::readyz,
    otc::{login, register, verify_code},
    session::{list_sessions, revoke_all_sessions, revoke_device_sessions, session_history},
    token::{check_token, refresh_token, revoke_token},
};
use crate::state::AppState;

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none");
    info_span!(
        "http_request",
        method = %request.method(),
        path = request.uri().path(),
        request_id
    )
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // One-time codes
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/otc/verify", post(verify_code))
        // Token
        .route("/auth/token", get(check_token))
        .route("/auth/token", delete(revoke_token))
        .route("/auth/token/refresh", post(refresh_token))
        // Sessions
        .route("/auth/sessions", get(list_sessions))
        .route("/auth/sessions", delete(revoke_all_sessions))
        .route("/auth/sessions/history", get(session_history))
        .route(
            "/auth/sessions/devices/{device_id}",
            delete(revoke_device_sessions),
        )
        // Email verification
        .route("/auth/email", post(request_email_code))
        .route("/auth/email/verify", post(confirm_email))
        // Security administration
        .route("/security/challenge/check", post(check_challenge))
        .route("/security/challenge/complete", post(complete_challenge))
        .route("/security/lockout/{identifier}", get(lockout_status))
        .route("/security/admin/unlock", post(unlock))
        .route("/security/admin/reset-rate-limit", post(reset_rate_limit))
        .route("/security/rate-limit/{identifier}", get(rate_limit_status))
        .route("/security/risk/{user_id}", get(risk_assessment))
        .layer(
            ServiceBuilder::new()
                .layer(request_id_layer())
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID_HEADER,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
        .with_state(state)
}
