//! Bearer credential extraction.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use domain::{AuthError, Subject};
use order_store::OrderStore;

use crate::AppState;
use crate::error::ApiError;

/// Extractor that requires a verified subject.
///
/// Reads `Authorization: Bearer <token>` and verifies it with the
/// configured identity provider. Capability checks happen in the domain
/// operations, not here.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(AuthSubject(subject): AuthSubject) -> String {
///     format!("Hello, {}!", subject.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthSubject(pub Subject);

impl<S> FromRequestParts<Arc<AppState<S>>> for AuthSubject
where
    S: OrderStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let subject = state.identity.verify(token).inspect_err(|err| {
            tracing::debug!(error = %err, path = %parts.uri.path(), "credential rejected");
        })?;
        Ok(Self(subject))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredential)?;
    let value = header
        .to_str()
        .map_err(|_| AuthError::InvalidCredential("non-ascii header".to_string()))?;

    match value.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        Some(_) => Err(AuthError::MissingCredential),
        None => Err(AuthError::InvalidCredential(
            "expected a Bearer token".to_string(),
        )),
    }
}
