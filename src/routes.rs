//! Route definitions
//!
//! Protected routes sit behind the authenticate middleware; individual
//! routes attach their preware chains in declaration order.

use crate::auth::{middleware::authenticate, preware::Preware, roles::RoleScope};
use crate::{handlers, AppState};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/session", delete(handlers::logout))
        .route("/session/me", get(handlers::current_principal))
        .route(
            "/admin/users",
            get(handlers::list_users).route_layer(
                Preware::scope(RoleScope::Admin)
                    .require_admin_group(["root"])
                    .into_layer(),
            ),
        )
        .layer(middleware::from_fn_with_state(state, authenticate));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/session", post(handlers::login))
        .merge(protected)
}
