//! # Passkey Registration Ceremony
//!
//! Enrolls a new credential for an identity. Two steps: start and verify.
//!
//! ## Registration Flow
//! 1. **Start**: check the identity may register, create it if needed, issue
//!    a challenge, send creation options to the client
//! 2. **Verify**: consume the challenge, have the verifier check the
//!    authenticator's response, store the new credential
//!
//! ## Policy: one registration per identity
//! An identity that already has a passkey cannot register another one,
//! unless the session has signed in as that identity (and the server allows
//! additional credentials). This blocks strangers from attaching their own
//! key to someone else's account. The rule is checked at start and again,
//! atomically with the insert, at verify: two anonymous sessions racing on a
//! fresh email get one credential between them.

use crate::db::{Credential, Identity};
use crate::error::CeremonyError;
use crate::session::CeremonySession;
use crate::state::AppState;
use crate::webauthn::challenge::CeremonyKind;
use crate::webauthn::cose::SUPPORTED_ALGORITHMS;
use crate::webauthn::types::*;
use crate::webauthn::{normalize_identity, user_verification, CeremonyPhase};
use chrono::Utc;
use serde_json::Value;

/// Fetch the identity, creating it on first contact
///
/// Two concurrent starts for a new email may both try to create it; the
/// loser just reads the winner's row.
async fn ensure_identity(state: &AppState, email: &str) -> Result<Identity, CeremonyError> {
    if let Some(identity) = state.store.get_identity(email).await? {
        return Ok(identity);
    }
    match state.store.create_identity(email).await {
        Ok(identity) => {
            tracing::info!(identity = email, "identity created");
            Ok(identity)
        }
        Err(crate::db::StoreError::AlreadyExists) => state
            .store
            .get_identity(email)
            .await?
            .ok_or(CeremonyError::UnknownIdentity),
        Err(e) => Err(e.into()),
    }
}

/// Whether this session may enroll a further credential for `email`
async fn owner_may_add(
    state: &AppState,
    session: &dyn CeremonySession,
    email: &str,
) -> Result<bool, CeremonyError> {
    let signed_in = session.identity().await?;
    Ok(signed_in.as_deref() == Some(email) && state.config.allow_additional_credentials)
}

/// Start the passkey registration process
///
/// ## Flow
/// 1. Refuse if the identity already has credentials (unless signed in as it)
/// 2. Create the identity if absent
/// 3. Issue a challenge bound to this session and identity
/// 4. Return `navigator.credentials.create()` options
///
/// ## Errors
/// - `InvalidIdentity`: blank email
/// - `DuplicateIdentity`: identity already registered
pub async fn start(
    state: &AppState,
    session: &dyn CeremonySession,
    email: &str,
) -> Result<CreationOptions, CeremonyError> {
    let email = normalize_identity(email)?;
    let existing = state.store.credentials(email).await?;

    // Further credentials only for the signed-in owner
    if !existing.is_empty() && !owner_may_add(state, session, email).await? {
        tracing::info!(identity = email, "registration refused: already registered");
        return Err(CeremonyError::DuplicateIdentity);
    }

    let identity = ensure_identity(state, email).await?;
    let challenge = state
        .binder
        .issue(session, email, CeremonyKind::Registration)
        .await?;

    tracing::debug!(identity = email, phase = ?CeremonyPhase::OptionsIssued, "registration started");

    let config = &state.config;
    Ok(CreationOptions {
        challenge,
        rp: RelyingPartyEntity {
            id: config.rp_id.clone(),
            name: config.rp_name.clone(),
        },
        user: UserEntity {
            id: Base64Url(identity.user_handle),
            name: identity.id.clone(),
            display_name: identity.id,
        },
        pub_key_cred_params: SUPPORTED_ALGORITHMS
            .iter()
            .map(|&alg| CredentialParameter {
                type_: PUBLIC_KEY_TYPE.to_string(),
                alg,
            })
            .collect(),
        timeout: config.ceremony_timeout_ms,
        attestation: "none".to_string(),
        // Keeps the authenticator from creating a second key for the same account
        exclude_credentials: existing
            .into_iter()
            .map(|c| CredentialDescriptor {
                id: Base64Url(c.credential_id),
                type_: PUBLIC_KEY_TYPE.to_string(),
                transports: c.transports,
            })
            .collect(),
        authenticator_selection: AuthenticatorSelection {
            resident_key: ResidentKey::Preferred,
            require_resident_key: false,
            user_verification: user_verification(config),
        },
        extensions: RegistrationExtensions { cred_props: true },
    })
}

/// Finish the passkey registration process
///
/// ## Flow
/// 1. Take the binding out of the session (cleared on every exit path)
/// 2. Consume the challenge for this identity
/// 3. Parse the client's credential
/// 4. Verify it (challenge, origin, RP id, flags, public key)
/// 5. Store the new credential, re-checking the one-registration policy
///
/// Nothing is written unless every step succeeds.
///
/// ## What can go wrong?
/// - `InvalidSession`: no challenge, expired, or issued for another identity
/// - `InvalidIdentity`: blank email
/// - `UnknownIdentity`: identity vanished between start and verify
/// - `DuplicateIdentity`: another session registered this identity first
/// - `VerificationFailed`: malformed or invalid response, or the credential
///   id is already registered (possible reuse across accounts)
pub async fn verify(
    state: &AppState,
    session: &dyn CeremonySession,
    email: &str,
    credential: &Value,
) -> Result<Credential, CeremonyError> {
    let result = finish(state, session, email, credential).await;

    let email = email.trim();
    match &result {
        Ok(_) => {
            tracing::info!(identity = email, phase = ?CeremonyPhase::Verified, "passkey registered")
        }
        Err(e) => {
            tracing::warn!(identity = email, phase = ?CeremonyPhase::Failed, error = %e, "registration failed")
        }
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
        .consume(binding, CeremonyKind::Registration, email)?;

    let identity = state
        .store
        .get_identity(email)
        .await?
        .ok_or(CeremonyError::UnknownIdentity)?;

    let response: RegistrationResponse =
        serde_json::from_value(credential.clone()).map_err(|e| {
            tracing::debug!(error = %e, "unparsable registration response");
            CeremonyError::VerificationFailed
        })?;

    let verified = state
        .verifier
        .verify_registration(&response, &state.expectations(&challenge))
        .map_err(|e| {
            tracing::debug!(error = %e, "registration response rejected");
            CeremonyError::VerificationFailed
        })?;

    let credential = Credential {
        credential_id: verified.credential_id,
        public_key: verified.public_key,
        counter: verified.counter,
        device_type: verified.device_type,
        backed_up: verified.backed_up,
        transports: response.transports(),
        created_at: Utc::now(),
        last_used_at: None,
    };

    let added = if owner_may_add(state, session, email).await? {
        state.store.add_credential(&identity.id, credential.clone()).await
    } else {
        state.store.add_first_credential(&identity.id, credential.clone()).await
    };

    match added {
        Ok(()) => Ok(credential),
        Err(crate::db::StoreError::DuplicateCredential) => {
            // Same authenticator key already enrolled, maybe on another account
            tracing::warn!(identity = email, "credential id already registered");
            Err(CeremonyError::VerificationFailed)
        }
        Err(crate::db::StoreError::AlreadyExists) => {
            tracing::warn!(identity = email, "registration lost to a concurrent one");
            Err(CeremonyError::DuplicateIdentity)
        }
        Err(e) => Err(e.into()),
    }
}
