//! Authentication and authorization
//!
//! Answers two questions per request: who is this caller (an opaque session
//! credential resolved to a principal) and is this caller allowed to reach
//! this route (role scope plus preware predicates).

pub mod credentials;
pub mod fixtures;
pub mod middleware;
pub mod preware;
pub mod roles;
pub mod sessions;
pub mod users;

#[cfg(feature = "sqlite")]
pub mod database;

#[cfg(test)]
mod tests;

use crate::AppState;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use roles::{AdminRole, RoleRef, RoleScope};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

/// The resolved, authenticated identity for one request.
///
/// Roles are snapshotted at resolution time; later role changes do not
/// retroactively affect an in-flight request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    /// User ID
    pub user_id: String,
    /// Username
    pub username: String,
    /// Set once at creation for the reserved system root identity
    pub is_system_root: bool,
    /// The session this request authenticated with
    pub session_id: String,
    /// Snapshot of the user's role assignments
    pub roles: RoleSet,
}

/// A principal's role assignments, hydrated at resolution time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleSet {
    /// Admin role holder, with its group mapping
    pub admin: Option<AdminRole>,
    /// Account role holder reference
    pub account: Option<RoleRef>,
}

impl RoleSet {
    /// Check whether a role scope is held
    pub fn holds(&self, scope: RoleScope) -> bool {
        match scope {
            RoleScope::Admin => self.admin.is_some(),
            RoleScope::Account => self.account.is_some(),
        }
    }
}

/// Authentication errors
///
/// `MalformedCredential` and `Unauthenticated` deliberately render as the
/// same 401 body so callers cannot tell which half of a credential failed.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Malformed credential")]
    MalformedCredential,
    #[error("Unauthenticated")]
    Unauthenticated,
    #[error("Session creation failed")]
    SessionCreation,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            AuthError::MalformedCredential | AuthError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "Authentication required",
            ),
            AuthError::SessionCreation => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "session_creation_failed",
                "Failed to create session",
            ),
        };

        let body = Json(json!({
            "error": error_code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Policy denial from a preware predicate
#[derive(Debug)]
pub struct PermissionDenied {
    pub reason: &'static str,
}

impl PermissionDenied {
    pub fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

impl IntoResponse for PermissionDenied {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "forbidden",
                "message": self.reason,
            })),
        )
            .into_response()
    }
}

/// Errors from the backing stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Record already exists: {0}")]
    Conflict(String),
    #[error("Hashing failed: {0}")]
    Hash(String),
    #[error("Database error: {0}")]
    Database(String),
}

/// Resolve an authorization header value to a principal.
///
/// Decode failures are `MalformedCredential`; every resolution failure past
/// that point (unknown session, key mismatch, dangling user reference) is
/// `Unauthenticated`. A dangling admin/account role reference is treated as
/// the role being absent, not as an authentication failure.
pub async fn resolve_credential(
    header_value: &str,
    state: &AppState,
) -> Result<AuthenticatedPrincipal, AuthError> {
    let (session_id, session_key) = credentials::decode_basic(header_value)?;

    let session = state
        .sessions
        .find_by_credential(&session_id, &session_key)
        .await
        .ok_or(AuthError::Unauthenticated)?;

    // Sessions must not outlive their user; a dangling reference is treated
    // as unauthenticated, not as a server fault.
    let user = state
        .users
        .get_user_by_id(&session.user_id)
        .await
        .ok_or_else(|| {
            warn!("Session {} references a missing user", session.id);
            AuthError::Unauthenticated
        })?;

    let mut roles = RoleSet::default();
    if let Some(admin_ref) = &user.roles.admin {
        match state.roles.get_admin(&admin_ref.id).await {
            Some(admin) => {
                roles.admin = Some(AdminRole {
                    id: admin.id,
                    name: admin.name,
                    groups: admin.groups,
                });
            }
            None => warn!(
                "User {} has a dangling admin role reference: {}",
                user.username, admin_ref.id
            ),
        }
    }
    if let Some(account_ref) = &user.roles.account {
        roles.account = Some(account_ref.clone());
    }

    // Best-effort; authorization does not depend on this succeeding.
    state.sessions.update_access(&session.id).await;

    debug!("Resolved principal: {}", user.username);

    Ok(AuthenticatedPrincipal {
        user_id: user.id,
        username: user.username,
        is_system_root: user.is_system_root,
        session_id: session.id,
        roles,
    })
}

/// Extractor for the authenticated principal.
///
/// Routes behind the authenticate middleware get the principal from request
/// extensions; otherwise the authorization header is resolved directly.
impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<AuthenticatedPrincipal>() {
            return Ok(principal.clone());
        }

        let state = AppState::from_ref(state);
        let header_value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MalformedCredential)?
            .to_str()
            .map_err(|_| AuthError::MalformedCredential)?;

        resolve_credential(header_value, &state).await
    }
}

/// Hash a secret (password or session key) using Argon2
pub(crate) fn hash_secret(secret: &str) -> Result<String, StoreError> {
    use argon2::{
        password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
        Argon2,
    };

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Hash(e.to_string()))
}

/// Verify a secret against an Argon2 hash
pub(crate) fn verify_secret(secret: &str, hash: &str) -> bool {
    use argon2::{
        password_hash::{PasswordHash, PasswordVerifier},
        Argon2,
    };

    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok()
}
