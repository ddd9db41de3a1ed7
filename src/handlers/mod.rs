//! # HTTP Request Handlers
//!
//! This module contains all the HTTP route handlers (controllers).
//! Each handler processes a specific API endpoint.
//!
//! ## Submodules
//! - `health`: Health check endpoint (for monitoring)
//! - `auth`: Ceremony endpoints (register, login) and the session endpoints
//! - `users`: Profile of the signed-in identity
//!
//! ## Handler Pattern
//! Handlers are async functions that:
//! 1. Extract data from request (JSON body, session)
//! 2. Call a ceremony or the credential store
//! 3. Return a response (JSON, status code)
//!
//! ## Routes
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | /health | `health::health_check` |
//! | POST | /api/register | `auth::register` |
//! | POST | /api/login | `auth::login` |
//! | GET | /api/session | `auth::session_info` |
//! | DELETE | /api/session | `auth::logout` |
//! | GET | /api/users/me | `users::get_current_user` (signed in only) |

pub mod auth;
pub mod health;
pub mod users;

use crate::middleware::auth::require_auth;
use crate::state::AppState;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};

/// API routes with state attached
///
/// The handlers extract `tower_sessions::Session`, so the caller must wrap
/// the result in a `SessionManagerLayer`.
pub fn router(state: AppState) -> Router {
    // Any unauthenticated request here gets 401 before the handler runs
    let protected_routes = Router::new()
        .route("/api/users/me", get(users::get_current_user))
        .route_layer(axum_middleware::from_fn(require_auth));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route(
            "/api/session",
            get(auth::session_info).delete(auth::logout),
        )
        .merge(protected_routes)
        .with_state(state)
}
