//! # WebAuthn Module
//!
//! This module contains the WebAuthn/Passkey logic for passwordless authentication.
//!
//! ## Submodules
//! - `types`: Request/response types for the API
//! - `challenge`: One-time challenges bound to a session and identity
//! - `counter`: Signature counter replay policy
//! - `registration`: Creating new passkey credentials
//! - `authentication`: Logging in with existing passkeys
//! - `verifier`: The signature/attestation verification seam
//! - `ring_verifier`, `cose`: Its production implementation
//!
//! ## WebAuthn Flow Overview
//!
//! ### Registration (Creating a Passkey)
//! 1. Client requests registration → `registration::start()`
//! 2. Server binds a challenge to the session and sends creation options
//! 3. Client uses WebAuthn API to create credential with authenticator
//! 4. Client sends credential back to server → `registration::verify()`
//! 5. Server verifies credential and stores public key
//!
//! ### Authentication (Logging In)
//! 1. Client requests authentication → `authentication::start()`
//! 2. Server binds a challenge and sends allowed credentials to client
//! 3. Client uses WebAuthn API to sign challenge with authenticator
//! 4. Client sends signed assertion back to server → `authentication::verify()`
//! 5. Server verifies signature using stored public key and checks the counter
//! 6. If valid, the session is marked as signed in
//!
//! Each ceremony moves `Idle -> OptionsIssued -> Verified | Failed`. There is
//! no retry from `Failed`: the challenge is gone and the client starts over.

pub mod authentication;
pub mod challenge;
pub mod cose;
pub mod counter;
pub mod registration;
pub mod ring_verifier;
pub mod types;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::Config;
use crate::error::CeremonyError;
use types::UserVerification;

/// Where a ceremony stands, as reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyPhase {
    Idle,
    OptionsIssued,
    Verified,
    Failed,
}

/// User verification requested from the authenticator
pub(crate) fn user_verification(config: &Config) -> UserVerification {
    if config.require_user_verification {
        UserVerification::Required
    } else {
        UserVerification::Preferred
    }
}

/// Identity key as the store sees it: surrounding whitespace dropped
///
/// Both ceremonies pass every presented email through here, so `" a@x.com "`
/// and `"a@x.com"` are one identity and a blank email is never stored.
pub fn normalize_identity(email: &str) -> Result<&str, CeremonyError> {
    let email = email.trim();
    if email.is_empty() {
        Err(CeremonyError::InvalidIdentity)
    } else {
        Ok(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_trimmed() {
        assert_eq!(normalize_identity("  a@x.com\t").unwrap(), "a@x.com");
        assert_eq!(normalize_identity("a@x.com").unwrap(), "a@x.com");
    }

    #[test]
    fn blank_identity_is_rejected() {
        for blank in ["", "   ", "\n\t"] {
            assert!(matches!(
                normalize_identity(blank),
                Err(CeremonyError::InvalidIdentity)
            ));
        }
    }
}
