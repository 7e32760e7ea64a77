use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use ridepool_auth_types::guard::VerificationDenied;
use ridepool_auth_types::token::AuthError;
use ridepool_domain::account::VerificationRequirement;
use ridepool_domain::channel::ChannelError;

/// Failure of the shared ephemeral store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Auth service domain error variants.
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("no active code for this channel")]
    OtcNotFound,
    #[error("code expired")]
    OtcExpired,
    #[error("code already used")]
    OtcAlreadyUsed,
    #[error("too many incorrect attempts")]
    OtcMaxAttempts,
    #[error("invalid code, {remaining_attempts} attempts remaining")]
    InvalidCode { remaining_attempts: u32 },
    #[error("too many requests")]
    RateLimitExceeded,
    #[error("account temporarily locked")]
    AccountLocked,
    #[error("account not found")]
    AccountNotFound,
    #[error("account already exists")]
    AccountAlreadyExists,
    #[error("account suspended")]
    AccountSuspended,
    #[error("missing credentials")]
    MissingCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token signature")]
    BadSignature,
    #[error("malformed token")]
    MalformedToken,
    #[error("token revoked")]
    TokenRevoked,
    #[error("token rejected: {0}")]
    TokenRejected(String),
    #[error("wrong token type")]
    InvalidTokenType,
    #[error("session not found")]
    SessionNotFound,
    #[error("{0} required")]
    VerificationRequired(VerificationRequirement),
    #[error("forbidden")]
    Forbidden,
    #[error("service temporarily unavailable")]
    StoreUnavailable(#[from] StoreError),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::OtcNotFound => "OTC_NOT_FOUND",
            Self::OtcExpired => "OTC_EXPIRED",
            Self::OtcAlreadyUsed => "OTC_ALREADY_USED",
            Self::OtcMaxAttempts => "OTC_MAX_ATTEMPTS",
            Self::InvalidCode { .. } => "INVALID_CODE",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::AccountNotFound => "ACCOUNT_NOT_FOUND",
            Self::AccountAlreadyExists => "ACCOUNT_ALREADY_EXISTS",
            Self::AccountSuspended => "ACCOUNT_SUSPENDED",
            Self::MissingCredentials => "MISSING_CREDENTIALS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::BadSignature => "BAD_SIGNATURE",
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::TokenRejected(_) => "TOKEN_REJECTED",
            Self::InvalidTokenType => "INVALID_TOKEN_TYPE",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::VerificationRequired(_) => "VERIFICATION_REQUIRED",
            Self::Forbidden => "FORBIDDEN",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<AuthError> for AuthServiceError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Expired => Self::TokenExpired,
            AuthError::InvalidSignature => Self::BadSignature,
            AuthError::Malformed => Self::MalformedToken,
            AuthError::Rejected(reason) => Self::TokenRejected(reason),
        }
    }
}

impl From<VerificationDenied> for AuthServiceError {
    fn from(e: VerificationDenied) -> Self {
        Self::VerificationRequired(e.requirement)
    }
}

impl From<ChannelError> for AuthServiceError {
    fn from(e: ChannelError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl IntoResponse for AuthServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_)
            | Self::OtcNotFound
            | Self::OtcExpired
            | Self::OtcAlreadyUsed
            | Self::OtcMaxAttempts => StatusCode::BAD_REQUEST,
            Self::InvalidCode { .. }
            | Self::MissingCredentials
            | Self::TokenExpired
            | Self::BadSignature
            | Self::MalformedToken
            | Self::TokenRevoked
            | Self::TokenRejected(_)
            | Self::InvalidTokenType
            | Self::SessionNotFound => StatusCode::UNAUTHORIZED,
            Self::AccountSuspended | Self::VerificationRequired(_) | Self::Forbidden => {
                StatusCode::FORBIDDEN
            }
            Self::AccountNotFound => StatusCode::NOT_FOUND,
            Self::AccountAlreadyExists => StatusCode::CONFLICT,
            Self::AccountLocked => StatusCode::LOCKED,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Log infrastructure failures only; TraceLayer already records status for every request.
        match &self {
            Self::Internal(e) => tracing::error!(error = %e, kind = "INTERNAL", "internal error"),
            Self::StoreUnavailable(e) => {
                tracing::error!(error = %e, kind = "STORE_UNAVAILABLE", "store unavailable")
            }
            _ => {}
        }
        let mut body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Self::InvalidCode { remaining_attempts } = self {
            body["remaining_attempts"] = remaining_attempts.into();
        }
        (status, axum::Json(body)).into_response()
    }
}
