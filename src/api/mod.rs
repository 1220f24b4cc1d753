//! HTTP surface of vrin-auth, mounted under /api:
//! - /api/auth/password, /api/auth/enterprise/password: password sign-in
//! - /api/auth/stytch-sync: Legacy Credential Bridge
//! - /api/auth/authenticate, /magic-link, /oauth/{provider}/start: discovery flow
//! - /api/auth/session, /api/auth/logout: session cookies
//! - /api/status: health check

pub mod consumed;
pub mod cookies;
pub mod extract;
pub mod routes;

use crate::SharedState;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", routes::api_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
