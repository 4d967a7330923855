//! API route handlers.

pub mod auth;

use crate::auth::middleware::AppState;
use axum::{routing::get, routing::post, Router};

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/nonce", get(auth::issue_nonce))
        .route("/api/auth/verify", post(auth::verify))
        .route("/api/auth/session", get(auth::current_session))
        .route("/api/auth/logout", post(auth::logout))
}
