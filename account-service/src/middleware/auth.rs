use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{models::AccountId, AppState};

/// Identity of the caller, resolved from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub account_id: AccountId,
    pub email: String,
}

fn bearer_token(req: &Request) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Require a valid access token and attach [`AuthContext`] to the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
    })?;

    let (account_id, email) = state.codec.verify_access(token).map_err(|e| {
        tracing::debug!(reason = e.kind(), "Bearer token rejected");
        AppError::from(e)
    })?;

    req.extensions_mut().insert(AuthContext { account_id, email });

    Ok(next.run(req).await)
}

/// Extractor for handlers behind [`auth_middleware`].
pub struct AuthUser(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Auth context missing from request extensions"
                ))
            })
    }
}
