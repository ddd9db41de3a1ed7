//! # User Handlers
//!
//! Profile of the signed-in identity and its passkeys.

use crate::db::{AuthenticatorTransport, Credential, DeviceType};
use crate::error::{AppError, AppResult};
use crate::session::CeremonySession;
use crate::state::AppState;
use crate::webauthn::types::Base64Url;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_sessions::Session;

/// One passkey as shown to its owner
///
/// The public key is left out; it is of no use to the client.
#[derive(Debug, Serialize)]
pub struct CredentialSummary {
    pub id: Base64Url,
    pub device_type: DeviceType,
    pub backed_up: bool,
    pub transports: Vec<AuthenticatorTransport>,
    pub counter: u32,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<Credential> for CredentialSummary {
    fn from(c: Credential) -> Self {
        CredentialSummary {
            id: Base64Url(c.credential_id),
            device_type: c.device_type,
            backed_up: c.backed_up,
            transports: c.transports,
            counter: c.counter,
            created_at: c.created_at,
            last_used_at: c.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub credentials: Vec<CredentialSummary>,
}

/// Get current authenticated user's profile
///
/// ## Route
/// GET /api/users/me
///
/// ## Authentication
/// Requires authentication (protected by require_auth middleware)
///
/// ## Response
/// ```json
/// {
///   "email": "alice@example.com",
///   "created_at": "2024-01-15T10:30:00Z",
///   "credentials": [
///     { "id": "...", "device_type": "multiDevice", "backed_up": true,
///       "transports": ["internal"], "counter": 0, ... }
///   ]
/// }
/// ```
pub async fn get_current_user(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Profile>> {
    // require_auth already checked this, but the session may have been
    // destroyed in between
    let email = session
        .identity()
        .await?
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

    let identity = state
        .store
        .get_identity(&email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

    let credentials = state.store.credentials(&email).await?;

    Ok(Json(Profile {
        email: identity.id,
        created_at: identity.created_at,
        credentials: credentials.into_iter().map(CredentialSummary::from).collect(),
    }))
}
