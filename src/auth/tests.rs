//! Scenario tests for authentication and the preware guard chain

use super::fixtures;
use super::middleware::authenticate;
use super::preware::Preware;
use super::roles::RoleScope;
use crate::{AppConfig, AppState};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn ok_handler() -> Json<Value> {
    Json(json!({ "message": "ok" }))
}

/// Router with the guard arrangements the scenarios exercise
fn guarded_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/limited/to/root/group",
            get(ok_handler).route_layer(
                Preware::scope(RoleScope::Admin)
                    .require_admin_group(["root"])
                    .into_layer(),
            ),
        )
        .route(
            "/limited/to/multiple/groups",
            get(ok_handler).route_layer(
                Preware::scope(RoleScope::Admin)
                    .require_admin_group(["sales", "support"])
                    .into_layer(),
            ),
        )
        .route(
            "/just/not/the/root/user",
            get(ok_handler).route_layer(
                Preware::scope(RoleScope::Admin)
                    .require_not_system_root()
                    .into_layer(),
            ),
        )
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .with_state(state)
}

async fn test_state() -> AppState {
    AppState::new(AppConfig::default()).await.unwrap()
}

async fn get_with_auth(app: &Router, uri: &str, auth_header: &str) -> StatusCode {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::AUTHORIZATION, auth_header)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn it_prevents_access_when_group_membership_misses() {
    let state = test_state().await;
    let admin = fixtures::create_admin_user(
        &state,
        "Ren Hoek",
        "ren",
        "baddog",
        "ren@stimpy.show",
        &["Sales"],
    )
    .await
    .unwrap();
    let app = guarded_router(state);

    let status = get_with_auth(&app, "/limited/to/root/group", &admin.auth_header).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn it_grants_access_when_group_membership_hits() {
    let state = test_state().await;
    let admin = fixtures::create_admin_user(
        &state,
        "Ren Hoek",
        "ren",
        "baddog",
        "ren@stimpy.show",
        &["Sales"],
    )
    .await
    .unwrap();
    let app = guarded_router(state);

    let status = get_with_auth(&app, "/limited/to/multiple/groups", &admin.auth_header).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn it_prevents_access_to_the_root_user() {
    let state = test_state().await;
    let root = fixtures::create_root_admin_user(&state).await.unwrap();
    let app = guarded_router(state);

    // Root's own group membership does not matter; the deny-override wins
    let status = get_with_auth(&app, "/just/not/the/root/user", &root.auth_header).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn it_grants_access_to_non_root_users() {
    let state = test_state().await;
    let admin = fixtures::create_admin_user(
        &state,
        "Ren Hoek",
        "ren",
        "baddog",
        "ren@stimpy.show",
        &["Sales"],
    )
    .await
    .unwrap();
    let app = guarded_router(state);

    let status = get_with_auth(&app, "/just/not/the/root/user", &admin.auth_header).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn it_rejects_scope_gated_routes_for_account_users() {
    let state = test_state().await;
    let account =
        fixtures::create_account_user(&state, "Stimpy", "stimpy", "happyjoy", "s@stimpy.show")
            .await
            .unwrap();
    let app = guarded_router(state);

    // Authenticated, but lacking the admin scope: policy denial, not 401
    let status = get_with_auth(&app, "/limited/to/multiple/groups", &account.auth_header).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn it_rejects_missing_and_malformed_credentials() {
    let state = test_state().await;
    fixtures::create_admin_user(
        &state,
        "Ren Hoek",
        "ren",
        "baddog",
        "ren@stimpy.show",
        &["Sales"],
    )
    .await
    .unwrap();
    let app = guarded_router(state);

    // No header at all
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/limited/to/multiple/groups")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong scheme and garbage payloads
    for bad in ["Bearer abcdef", "Basic not-base64!!!", "Basic ", "nonsense"] {
        let status = get_with_auth(&app, "/limited/to/multiple/groups", bad).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "header: {}", bad);
    }
}

#[tokio::test]
async fn it_rejects_mismatched_session_credentials() {
    let state = test_state().await;
    let ren = fixtures::create_admin_user(
        &state,
        "Ren Hoek",
        "ren",
        "baddog",
        "ren@stimpy.show",
        &["Sales"],
    )
    .await
    .unwrap();
    let stimpy =
        fixtures::create_account_user(&state, "Stimpy", "stimpy", "happyjoy", "s@stimpy.show")
            .await
            .unwrap();
    let app = guarded_router(state);

    // Valid id paired with a wrong key
    let forged = super::credentials::encode_basic(&ren.session.session.id, "wrong-key");
    let status = get_with_auth(&app, "/limited/to/multiple/groups", &forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Valid id paired with another session's key: same outcome, no
    // distinguishing signal
    let forged = super::credentials::encode_basic(&ren.session.session.id, &stimpy.session.key);
    let status = get_with_auth(&app, "/limited/to/multiple/groups", &forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn it_treats_a_dangling_user_reference_as_unauthenticated() {
    let state = test_state().await;
    let session = state
        .sessions
        .create("no-such-user", "127.0.0.1", "Lab")
        .await
        .unwrap();
    let auth_header = super::credentials::encode_basic(&session.session.id, &session.key);
    let app = guarded_router(state);

    let status = get_with_auth(&app, "/limited/to/multiple/groups", &auth_header).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
