//! # Ceremony and Session Handlers
//!
//! `POST /api/register` and `POST /api/login` each serve both steps of their
//! ceremony; the `step` field picks which one runs.
//!
//! The tower-sessions `Session` extractor is passed straight to the
//! ceremonies, which see it as a `CeremonySession`.

use crate::error::{AppError, AppResult};
use crate::session::CeremonySession;
use crate::state::AppState;
use crate::webauthn::types::CeremonyRequest;
use crate::webauthn::{authentication, registration};
use axum::{extract::State, Json};
use serde_json::{json, Value};
use tower_sessions::Session;

/// Which half of a ceremony the client asked for
enum Step<'a> {
    Start,
    Verify(&'a Value),
}

impl CeremonyRequest {
    fn step(&self) -> AppResult<Step<'_>> {
        match (self.step.as_str(), &self.credential) {
            ("start", _) => Ok(Step::Start),
            ("verify", Value::Null) => Err(invalid_request()),
            ("verify", credential) => Ok(Step::Verify(credential)),
            _ => Err(invalid_request()),
        }
    }
}

fn invalid_request() -> AppError {
    AppError::BadRequest("Invalid request".to_string())
}

/// Register a new passkey
///
/// ## Route
/// POST /api/register
///
/// ## Request
/// ```json
/// { "email": "alice@example.com", "step": "start" }
/// { "email": "alice@example.com", "step": "verify", "credential": { ... } }
/// ```
///
/// ## Response
/// - `start`: `PublicKeyCredentialCreationOptions` JSON
/// - `verify`: `{ "verified": true }`
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CeremonyRequest>,
) -> AppResult<Json<Value>> {
    match req.step()? {
        Step::Start => {
            let options = registration::start(&state, &session, &req.email).await?;
            Ok(Json(json!(options)))
        }
        Step::Verify(credential) => {
            registration::verify(&state, &session, &req.email, credential).await?;
            Ok(Json(json!({ "verified": true })))
        }
    }
}

/// Sign in with a passkey
///
/// ## Route
/// POST /api/login
///
/// Same request shape as `/api/register`. A successful `verify` signs the
/// session in (with a fresh session id).
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CeremonyRequest>,
) -> AppResult<Json<Value>> {
    match req.step()? {
        Step::Start => {
            let options = authentication::start(&state, &session, &req.email).await?;
            Ok(Json(json!(options)))
        }
        Step::Verify(credential) => {
            authentication::verify(&state, &session, &req.email, credential).await?;
            Ok(Json(json!({ "verified": true })))
        }
    }
}

/// Who is signed in
///
/// ## Route
/// GET /api/session
///
/// 200 `{ "email": ... }`, or 401 when the session is anonymous.
pub async fn session_info(session: Session) -> AppResult<Json<Value>> {
    match session.identity().await? {
        Some(email) => Ok(Json(json!({ "email": email }))),
        None => Err(AppError::Unauthorized("Not authenticated".to_string())),
    }
}

/// Sign out
///
/// ## Route
/// DELETE /api/session
pub async fn logout(session: Session) -> AppResult<Json<Value>> {
    if let Some(email) = session.identity().await? {
        tracing::info!(identity = %email, "signed out");
    }
    session.destroy().await?;

    Ok(Json(json!({ "success": true })))
}
