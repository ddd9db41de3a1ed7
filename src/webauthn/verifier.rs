//! # Verification Primitive
//!
//! The ceremonies treat signature/attestation checking as a black box behind
//! `AssertionVerifier`. It proves that the response was produced by the
//! authenticator holding the key, over our challenge, for our origin and
//! relying party. It does NOT decide freshness or replay: the challenge
//! binder and the counter policy do that.
//!
//! The server uses `RingVerifier`; tests substitute scripted fakes.

use crate::db::{Credential, DeviceType};
use crate::webauthn::types::{AuthenticationResponse, RegistrationResponse};
use thiserror::Error;

/// What the response must match
#[derive(Debug, Clone, Copy)]
pub struct Expectations<'a> {
    /// Challenge issued for this ceremony
    pub challenge: &'a [u8],
    /// Full origin, e.g. `https://example.com`
    pub origin: &'a str,
    /// Relying party id, e.g. `example.com`
    pub rp_id: &'a str,
    /// Reject responses without the UV flag
    pub require_user_verification: bool,
}

/// Data extracted from a valid registration response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRegistration {
    pub credential_id: Vec<u8>,
    /// COSE_Key bytes
    pub public_key: Vec<u8>,
    pub counter: u32,
    pub device_type: DeviceType,
    pub backed_up: bool,
    pub user_verified: bool,
    pub attestation_format: String,
}

/// Data extracted from a valid authentication response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAuthentication {
    pub credential_id: Vec<u8>,
    pub new_counter: u32,
    pub backed_up: bool,
    pub user_verified: bool,
}

/// Why a response was rejected
///
/// These are logged server-side only; callers just see "verification failed".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unexpected client data type '{0}'")]
    ClientDataType(String),

    #[error("challenge mismatch")]
    Challenge,

    #[error("unexpected origin '{0}'")]
    Origin(String),

    #[error("relying party id hash mismatch")]
    RpIdHash,

    #[error("user presence flag not set")]
    UserNotPresent,

    #[error("user verification required but not performed")]
    UserNotVerified,

    #[error("credential id mismatch")]
    CredentialId,

    #[error("unsupported public key (kty {kty}, alg {alg})")]
    UnsupportedKey { kty: i64, alg: i64 },

    #[error("signature check failed")]
    Signature,
}

/// Signature/attestation verification for both ceremonies
pub trait AssertionVerifier: Send + Sync {
    /// Check a `navigator.credentials.create()` response
    fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &Expectations<'_>,
    ) -> Result<VerifiedRegistration, VerifyError>;

    /// Check a `navigator.credentials.get()` response against a stored credential
    ///
    /// The stored counter is available in `stored`; applying the counter
    /// policy is left to the caller.
    fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        expected: &Expectations<'_>,
        stored: &Credential,
    ) -> Result<VerifiedAuthentication, VerifyError>;
}
