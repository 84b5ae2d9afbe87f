//! Authenticate middleware
//!
//! Resolves the authorization header to a principal and stashes it in
//! request extensions for the handler and any preware chain on the route.
//! Every failure here is a 401; policy denials (403) belong to preware.

use super::{resolve_credential, AuthError};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Authenticate the request or reject it with a 401
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header_value = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AuthError::MalformedCredential)?
        .to_str()
        .map_err(|_| AuthError::MalformedCredential)?;

    let principal = resolve_credential(header_value, &state).await?;
    debug!("Authenticated request for {}", principal.username);

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
