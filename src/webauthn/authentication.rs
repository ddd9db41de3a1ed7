//! # Passkey Authentication Ceremony
//!
//! Proves that the client holds the private key of a credential registered
//! to the identity, then marks the session as signed in.
//!
//! ## Authentication Flow
//! 1. **Start**: look up the identity's credentials, issue a challenge, send
//!    the allow-list to the client
//! 2. **Verify**: consume the challenge, check the assertion signature with
//!    the stored public key, apply the counter policy, persist the counter
//!
//! ## Signature counter
//! Each successful login advances the stored counter. A counter that fails
//! to move forward hints at a cloned authenticator and the login is refused.
//! See `webauthn::counter`.

use crate::db::Credential;
use crate::error::CeremonyError;
use crate::session::CeremonySession;
use crate::state::AppState;
use crate::webauthn::challenge::CeremonyKind;
use crate::webauthn::counter;
use crate::webauthn::types::*;
use crate::webauthn::{normalize_identity, user_verification, CeremonyPhase};
use serde_json::Value;

/// Start the passkey authentication process
///
/// Both failure cases are detected before a challenge is issued, so a
/// refused start leaves nothing outstanding.
///
/// ## Errors
/// - `InvalidIdentity`: blank email
/// - `UnknownIdentity`: no such identity
/// - `NoCredentials`: identity exists but never finished registering
pub async fn start(
    state: &AppState,
    session: &dyn CeremonySession,
    email: &str,
) -> Result<RequestOptions, CeremonyError> {
    let email = normalize_identity(email)?;
    if state.store.get_identity(email).await?.is_none() {
        return Err(CeremonyError::UnknownIdentity);
    }

    let credentials = state.store.credentials(email).await?;
    if credentials.is_empty() {
        return Err(CeremonyError::NoCredentials);
    }

    let challenge = state
        .binder
        .issue(session, email, CeremonyKind::Authentication)
        .await?;

    tracing::debug!(
        identity = email,
        credentials = credentials.len(),
        phase = ?CeremonyPhase::OptionsIssued,
        "authentication started"
    );

    Ok(RequestOptions {
        challenge,
        timeout: state.config.ceremony_timeout_ms,
        rp_id: state.config.rp_id.clone(),
        allow_credentials: credentials
            .into_iter()
            .map(|c| CredentialDescriptor {
                id: Base64Url(c.credential_id),
                type_: PUBLIC_KEY_TYPE.to_string(),
                transports: c.transports,
            })
            .collect(),
        user_verification: user_verification(&state.config),
    })
}

/// Finish the passkey authentication process
///
/// ## Flow
/// 1. Take the binding out of the session and consume the challenge
/// 2. Parse the assertion
/// 3. Find the credential among this identity's credentials only
/// 4. Check the user handle, if the authenticator sent one
/// 5. Verify the signature with the stored public key
/// 6. Apply the counter policy and persist the new counter
/// 7. Mark the session as authenticated
///
/// Returns the credential as updated in the store.
///
/// ## What can go wrong?
/// - `InvalidSession`: no challenge, expired, or issued for another identity
/// - `UnknownCredential`: credential not registered to this identity
/// - `VerificationFailed`: bad signature, malformed response, or counter replay
pub async fn verify(
    state: &AppState,
    session: &dyn CeremonySession,
    email: &str,
    credential: &Value,
) -> Result<Credential, CeremonyError> {
    let result = finish(state, session, email, credential).await;

    let email = email.trim();
    match &result {
        Ok(c) => tracing::info!(
            identity = email,
            counter = c.counter,
            phase = ?CeremonyPhase::Verified,
            "passkey authentication succeeded"
        ),
        Err(e) => tracing::warn!(
            identity = email,
            phase = ?CeremonyPhase::Failed,
            error = %e,
            "authentication failed"
        ),
    }
    result
}

async fn finish(
    state: &AppState,
    session: &dyn CeremonySession,
    email: &str,
    credential: &Value,
) -> Result<Credential, CeremonyError> {
    let binding = session.take_binding().await?;
    let email = normalize_identity(email)?;
    let challenge = state
        .binder
        .consume(binding, CeremonyKind::Authentication, email)?;

    let response: AuthenticationResponse =
        serde_json::from_value(credential.clone()).map_err(|e| {
            tracing::debug!(error = %e, "unparsable authentication response");
            CeremonyError::VerificationFailed
        })?;

    let stored = state
        .store
        .find_credential(email, response.raw_id.as_bytes())
        .await?
        .ok_or(CeremonyError::UnknownCredential)?;

    if let Some(handle) = &response.response.user_handle {
        let identity = state
            .store
            .get_identity(email)
            .await?
            .ok_or(CeremonyError::UnknownIdentity)?;
        if handle.as_bytes() != identity.user_handle.as_slice() {
            tracing::warn!(identity = email, "user handle does not match identity");
            return Err(CeremonyError::VerificationFailed);
        }
    }

    let verified = state
        .verifier
        .verify_authentication(&response, &state.expectations(&challenge), &stored)
        .map_err(|e| {
            tracing::debug!(error = %e, "assertion rejected");
            CeremonyError::VerificationFailed
        })?;

    let new_counter = counter::check(stored.counter, verified.new_counter).map_err(|e| {
        tracing::warn!(identity = email, error = %e, "possible cloned authenticator");
        CeremonyError::VerificationFailed
    })?;

    let updated = state
        .store
        .update_counter(email, &stored.credential_id, new_counter, verified.backed_up)
        .await?;

    session.authenticate(email).await?;
    Ok(updated)
}
