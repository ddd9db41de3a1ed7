//! Test doubles for the ceremony unit tests
//!
//! `ScriptedVerifier` skips cryptography entirely. For assertions it reads
//! the reported signature counter out of `authenticatorData`, which the
//! helpers below fill with the counter as 4 big-endian bytes.

use crate::db::{Credential, DeviceType};
use crate::webauthn::types::{AuthenticationResponse, Base64Url, RegistrationResponse};
use crate::webauthn::verifier::{
    AssertionVerifier, Expectations, VerifiedAuthentication, VerifiedRegistration, VerifyError,
};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct ScriptedVerifier {
    accept: bool,
    /// Expected `rawId`; `None` accepts whatever the client sends
    credential_id: Option<Vec<u8>>,
    counter: u32,
}

impl Default for ScriptedVerifier {
    fn default() -> Self {
        Self::registering(b"cred", 0)
    }
}

impl ScriptedVerifier {
    /// Accepts registrations of `credential_id` starting at `counter`
    pub fn registering(credential_id: &[u8], counter: u32) -> Self {
        Self {
            accept: true,
            credential_id: Some(credential_id.to_vec()),
            counter,
        }
    }

    /// Accepts registrations of any credential id, counter 0
    pub fn any_credential() -> Self {
        Self {
            accept: true,
            credential_id: None,
            counter: 0,
        }
    }

    /// Rejects everything
    pub fn rejecting() -> Self {
        Self {
            accept: false,
            ..Self::default()
        }
    }
}

impl AssertionVerifier for ScriptedVerifier {
    fn verify_registration(
        &self,
        response: &RegistrationResponse,
        _expected: &Expectations<'_>,
    ) -> Result<VerifiedRegistration, VerifyError> {
        if !self.accept {
            return Err(VerifyError::Signature);
        }
        if let Some(expected) = &self.credential_id {
            if response.raw_id.as_bytes() != expected.as_slice() {
                return Err(VerifyError::CredentialId);
            }
        }
        Ok(VerifiedRegistration {
            credential_id: response.raw_id.to_vec(),
            public_key: b"scripted-key".to_vec(),
            counter: self.counter,
            device_type: DeviceType::MultiDevice,
            backed_up: true,
            user_verified: true,
            attestation_format: "none".to_string(),
        })
    }

    fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        _expected: &Expectations<'_>,
        stored: &Credential,
    ) -> Result<VerifiedAuthentication, VerifyError> {
        if !self.accept {
            return Err(VerifyError::Signature);
        }
        let counter: [u8; 4] = response
            .response
            .authenticator_data
            .as_bytes()
            .try_into()
            .map_err(|_| VerifyError::Malformed("scripted counter".into()))?;
        Ok(VerifiedAuthentication {
            credential_id: stored.credential_id.clone(),
            new_counter: u32::from_be_bytes(counter),
            backed_up: stored.backed_up,
            user_verified: true,
        })
    }
}

/// Browser-shaped registration credential for `credential_id`
pub fn registration_json(credential_id: &[u8]) -> Value {
    let id = Base64Url::from(credential_id).to_string();
    json!({
        "id": id,
        "rawId": id,
        "type": "public-key",
        "response": {
            "clientDataJSON": "e30",
            "attestationObject": "oA",
            "transports": ["internal"]
        }
    })
}

/// Browser-shaped assertion for `credential_id` reporting `counter`
pub fn assertion_json(credential_id: &[u8], counter: u32, user_handle: Option<&[u8]>) -> Value {
    let id = Base64Url::from(credential_id).to_string();
    let mut response = json!({
        "clientDataJSON": "e30",
        "authenticatorData": Base64Url(counter.to_be_bytes().to_vec()).to_string(),
        "signature": "AA"
    });
    if let Some(handle) = user_handle {
        response["userHandle"] = json!(Base64Url::from(handle).to_string());
    }
    json!({
        "id": id,
        "rawId": id,
        "type": "public-key",
        "response": response
    })
}
