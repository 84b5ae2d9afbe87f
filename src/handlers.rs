//! HTTP handlers

use crate::auth::{users::UserInfo, AuthenticatedPrincipal, AuthError};
use crate::AppState;
use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    Json as JsonExtractor,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response: the created session plus a ready-to-use header value
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserInfo,
    pub session_id: String,
    /// Value for the `Authorization` header on subsequent requests
    pub authorization: String,
}

/// Open a session for a username/password pair.
///
/// Bad credentials produce the same 401 body as any authentication failure;
/// the response never says which half was wrong.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonExtractor(request): JsonExtractor<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    info!("Login attempt: {}", request.username);

    let user = state
        .users
        .authenticate(&request.username, &request.password)
        .await
        .ok_or(AuthError::Unauthenticated)?;

    let origin = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let user_agent = headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let created = state
        .sessions
        .create(&user.id, &origin, &user_agent)
        .await
        .map_err(|e| {
            warn!("Failed to create session for {}: {}", user.username, e);
            AuthError::SessionCreation
        })?;

    let authorization =
        crate::auth::credentials::encode_basic(&created.session.id, &created.key);

    info!("User logged in: {}", user.username);
    Ok(Json(LoginResponse {
        user: user.to_user_info(),
        session_id: created.session.id,
        authorization,
    }))
}

/// Invalidate the caller's current session
pub async fn logout(
    State(state): State<AppState>,
    principal: AuthenticatedPrincipal,
) -> Result<Json<Value>, AuthError> {
    info!("User logout: {}", principal.username);

    state
        .sessions
        .delete(&principal.session_id)
        .await
        .map_err(|e| {
            warn!("Failed to delete session {}: {}", principal.session_id, e);
            AuthError::SessionCreation
        })?;

    Ok(Json(json!({
        "message": "Logged out successfully",
        "user_id": principal.user_id,
    })))
}

/// Echo the authenticated principal
pub async fn current_principal(principal: AuthenticatedPrincipal) -> Json<Value> {
    Json(json!({
        "user_id": principal.user_id,
        "username": principal.username,
        "is_system_root": principal.is_system_root,
        "roles": principal.roles,
    }))
}

/// List all users; admin scope plus `root` group membership required
pub async fn list_users(
    State(state): State<AppState>,
    principal: AuthenticatedPrincipal,
) -> Json<Value> {
    info!("User listing requested by: {}", principal.username);

    let users = state.users.list_users().await;
    Json(json!({ "users": users }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::fixtures;
    use crate::{create_app, AppConfig, AppState};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        AppState::new(AppConfig::default()).await.unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_app(test_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_returns_usable_credential() {
        let state = test_state().await;
        fixtures::create_account_user(&state, "Stimpy", "stimpy", "happyjoy", "s@stimpy.show")
            .await
            .unwrap();
        let app = create_app(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/session")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({ "username": "stimpy", "password": "happyjoy" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let authorization = body["authorization"].as_str().unwrap().to_string();
        assert!(authorization.starts_with("Basic "));

        // The returned credential authenticates /api/session/me
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/session/me")
                    .header(header::AUTHORIZATION, authorization)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["username"], "stimpy");
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password() {
        let state = test_state().await;
        fixtures::create_account_user(&state, "Stimpy", "stimpy", "happyjoy", "s@stimpy.show")
            .await
            .unwrap();
        let app = create_app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/session")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({ "username": "stimpy", "password": "wrong" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let state = test_state().await;
        let provisioned =
            fixtures::create_account_user(&state, "Stimpy", "stimpy", "happyjoy", "s@stimpy.show")
                .await
                .unwrap();
        let app = create_app(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/session")
                    .header(header::AUTHORIZATION, provisioned.auth_header.clone())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The credential no longer authenticates
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/session/me")
                    .header(header::AUTHORIZATION, provisioned.auth_header)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_users_requires_root_group() {
        let state = test_state().await;
        let root = fixtures::create_root_admin_user(&state).await.unwrap();
        let sales = fixtures::create_admin_user(
            &state,
            "Ren Hoek",
            "ren",
            "baddog",
            "ren@stimpy.show",
            &["Sales"],
        )
        .await
        .unwrap();
        let app = create_app(state);

        // Root-group admin passes
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/admin/users")
                    .header(header::AUTHORIZATION, root.auth_header)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Sales-group admin is denied with a 403
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/admin/users")
                    .header(header::AUTHORIZATION, sales.auth_header)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
