//! Session-token format and stateless validation.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ridepool_domain::account::{AccountStatus, Permission, VerificationFlags};
use ridepool_domain::id::{SessionId, UserId};

/// Distinguishes short-lived access tokens from long-lived refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Errors returned by [`decode_token`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    /// Well-formed and correctly signed but refused for another reason (issuer, algorithm, nbf).
    #[error("token rejected: {0}")]
    Rejected(String),
}

/// Claims payload carried by both token kinds.
///
/// | Field | JWT claim | Meaning |
/// |-------|-----------|---------|
/// | `sub` | `sub` | user ID (UUID string) |
/// | `sid` | custom | session ID (UUID string) |
/// | `jti` | `jti` | unique token ID, the denylist key |
/// | `typ` | custom | `ACCESS` or `REFRESH` |
/// | `iss` / `iat` / `exp` | registered | issuer, issued-at and expiry (seconds since epoch) |
///
/// Verification flags, status and permissions are snapshotted at mint time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub sid: String,
    pub jti: String,
    pub typ: TokenKind,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
    pub mobile_verified: bool,
    pub email_verified: bool,
    pub account_status: AccountStatus,
    pub permissions: Vec<Permission>,
}

/// Parsed identity from a token whose signature, expiry and issuer checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub token_id: Uuid,
    pub kind: TokenKind,
    pub flags: VerificationFlags,
    pub account_status: AccountStatus,
    pub permissions: Vec<Permission>,
    pub expires_at: u64,
}

impl TryFrom<SessionClaims> for TokenInfo {
    type Error = AuthError;

    fn try_from(claims: SessionClaims) -> Result<Self, Self::Error> {
        let parse = |s: &str| s.parse::<Uuid>().map_err(|_| AuthError::Malformed);
        Ok(Self {
            user_id: UserId(parse(&claims.sub)?),
            session_id: SessionId(parse(&claims.sid)?),
            token_id: parse(&claims.jti)?,
            kind: claims.typ,
            flags: VerificationFlags {
                mobile_verified: claims.mobile_verified,
                email_verified: claims.email_verified,
            },
            account_status: claims.account_status,
            permissions: claims.permissions,
            expires_at: claims.exp,
        })
    }
}

// ── Core decode ──────────────────────────────────────────────────────────

/// Decode and validate a token, returning parsed identity.
///
/// Validation: HS256, exp checked, issuer must match, required claims `exp` + `sub` + `iss`.
/// Default leeway = 60s to tolerate clock skew between services.
/// Revocation is not checked here; that needs the denylist.
pub fn decode_token(token: &str, secret: &str, issuer: &str) -> Result<TokenInfo, AuthError> {
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_issuer(&[issuer]);
    validation.required_spec_claims.clear();
    validation.set_required_spec_claims(&["exp", "sub", "iss"]);

    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::InvalidEcdsaKey
        | jsonwebtoken::errors::ErrorKind::InvalidRsaKey(_) => AuthError::InvalidSignature,
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::Json(_)
        | jsonwebtoken::errors::ErrorKind::Utf8(_)
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_) => AuthError::Malformed,
        _ => AuthError::Rejected(e.to_string()),
    })?;

    TokenInfo::try_from(data.claims)
}

// ── Feature-gated: auth service only ─────────────────────────────────────

/// Sign claims with HS256.
///
/// Requires the `USE_ONLY_IN_AUTH_SERVICE` feature: the auth service is the sole issuer.
#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
pub fn encode_token(
    claims: &SessionClaims,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
}
