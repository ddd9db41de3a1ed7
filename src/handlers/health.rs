//! # Health Check Handler
//!
//! Simple endpoint to check if the server is running.
//! Used by load balancers and monitoring systems.

use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// Health check endpoint
///
/// ## Route
/// GET /health
///
/// ## Response
/// ```json
/// {
///   "status": "healthy",
///   "service": "passkey-ceremony-server",
///   "store": "sqlite",
///   "outstanding_challenges": 0
/// }
/// ```
///
/// Never fails, so it returns `Json<Value>` directly instead of `AppResult`.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "passkey-ceremony-server",
        "store": state.store.backend(),
        "outstanding_challenges": state.binder.outstanding()
    }))
}
