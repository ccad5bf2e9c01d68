use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use axum_extra::TypedHeader;
use headers::Authorization;
use headers::authorization::Bearer;
use subtle::ConstantTimeEq;

use crate::error::EntregasError;
use crate::router::EntregasState;

fn key_matches(candidate: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
}

/// Ensure the inbound request carries the configured API key.
/// Accepts either:
/// - Header: `Authorization: Bearer <key>`
/// - Header: `x-api-key: <key>`
/// - Query string: `?key=...`
///
/// An empty configured key rejects everything.
pub fn ensure_authorized(
    bearer: Option<&str>,
    headers: &HeaderMap,
    query: Option<&str>,
    expected: &str,
) -> Result<(), EntregasError> {
    if let Some(token) = bearer
        && key_matches(token, expected)
    {
        return Ok(());
    }

    if let Some(hv) = headers.get("x-api-key").and_then(|v| v.to_str().ok())
        && key_matches(hv, expected)
    {
        return Ok(());
    }

    if let Some(qs) = query {
        for (k, v) in url::form_urlencoded::parse(qs.as_bytes()) {
            if k == "key" && key_matches(&v, expected) {
                return Ok(());
            }
        }
    }

    Err(EntregasError::Unauthorized)
}

#[derive(Debug, Clone, Copy)]
pub struct RequireKeyAuth;

impl FromRequestParts<EntregasState> for RequireKeyAuth {
    type Rejection = EntregasError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &EntregasState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok();
        ensure_authorized(
            bearer.as_ref().map(|TypedHeader(auth)| auth.token()),
            &parts.headers,
            parts.uri.query(),
            &state.api_key,
        )?;
        Ok(Self)
    }
}
