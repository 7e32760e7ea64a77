//! Bearer-token extractor.

use axum::extract::FromRequestParts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use http::StatusCode;
use http::request::Parts;

/// Raw session token taken from `Authorization: Bearer <token>`.
///
/// Returns 401 if the header is absent or not a bearer credential.
/// Signature and revocation checks happen in the auth service after extraction.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    // Read the header synchronously and return a 'static future; see axum-core 0.5's
    // `impl Future + Send` signature.
    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let token = parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .map(|Authorization(bearer)| bearer.token().trim().to_owned())
            .filter(|t| !t.is_empty());

        async move { token.map(Self).ok_or(StatusCode::UNAUTHORIZED) }
    }
}
