use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};

use ridepool_auth_types::identity::BearerToken;
use ridepool_auth_types::token::TokenInfo;

use crate::domain::types::RateLimitPurpose;
use crate::error::AuthServiceError;
use crate::state::AppState;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Caller identity from a validated, unrevoked token, counted against the per-user API limit.
#[derive(Debug, Clone)]
pub struct Authenticated(pub TokenInfo);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AuthServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthServiceError::MissingCredentials)?;
        let info = state.session_manager().validate_token(&token).await?;
        let allowed = state
            .rate_limiter()
            .allow_purpose(RateLimitPurpose::Api, &info.user_id.to_string())
            .await;
        if !allowed {
            return Err(AuthServiceError::RateLimitExceeded);
        }
        Ok(Self(info))
    }
}

/// Gate for `/security/*` admin routes: `x-admin-key` must match the configured key.
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

fn digest(value: &[u8]) -> [u8; 32] {
    Sha256::digest(value).into()
}

impl FromRequestParts<AppState> for AdminKey {
    type Rejection = AuthServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .ok_or(AuthServiceError::MissingCredentials)?;
        if digest(presented.as_bytes()) != digest(state.config.admin_api_key.as_bytes()) {
            return Err(AuthServiceError::Forbidden);
        }
        Ok(Self)
    }
}

/// Source address and user agent of the request, as far as they can be told.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub source_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    fn from_parts(parts: &Parts) -> Self {
        let forwarded = parts
            .headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Self {
            source_address: forwarded.or(peer),
            user_agent,
        }
    }
}

impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}
