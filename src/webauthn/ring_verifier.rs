//! # Ring-backed Verifier
//!
//! Production `AssertionVerifier`. Parses the pieces of a WebAuthn response
//! and checks them:
//!
//! ## Registration
//! 1. `clientDataJSON`: type `webauthn.create`, our challenge, our origin
//! 2. `attestationObject` (CBOR): pull out `authData`; the attestation
//!    statement itself is not evaluated (we request `attestation: "none"`)
//! 3. `authData`: RP id hash, user present (and verified if required),
//!    attested credential data whose id matches `rawId`
//! 4. The credential public key must be a COSE key we can verify with
//!
//! ## Authentication
//! 1. `clientDataJSON`: type `webauthn.get`, challenge, origin
//! 2. `authenticatorData`: RP id hash, flags, sign count
//! 3. Signature over `authenticatorData || SHA-256(clientDataJSON)` with the
//!    stored public key

use crate::db::{Credential, DeviceType};
use crate::webauthn::cose::CoseKey;
use crate::webauthn::types::{AuthenticationResponse, Base64Url, RegistrationResponse, PUBLIC_KEY_TYPE};
use crate::webauthn::verifier::{
    AssertionVerifier, Expectations, VerifiedAuthentication, VerifiedRegistration, VerifyError,
};
use ciborium::value::Value;
use serde::Deserialize;
use sha2::{Digest, Sha256};

// Authenticator data flag bits
const FLAG_UP: u8 = 0x01;
const FLAG_UV: u8 = 0x04;
const FLAG_BE: u8 = 0x08;
const FLAG_BS: u8 = 0x10;
const FLAG_AT: u8 = 0x40;

/// rpIdHash (32) + flags (1) + signCount (4)
const AUTH_DATA_MIN_LEN: usize = 37;
/// aaguid (16) + credentialIdLength (2)
const ATTESTED_HEADER_LEN: usize = 18;

/// Decoded `clientDataJSON`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientData {
    #[serde(rename = "type")]
    type_: String,
    challenge: Base64Url,
    origin: String,
    #[serde(default)]
    cross_origin: bool,
}

impl ClientData {
    fn parse(raw: &[u8]) -> Result<Self, VerifyError> {
        serde_json::from_slice(raw)
            .map_err(|e| VerifyError::Malformed(format!("clientDataJSON: {e}")))
    }

    fn check(&self, expected_type: &str, expected: &Expectations<'_>) -> Result<(), VerifyError> {
        if self.type_ != expected_type {
            return Err(VerifyError::ClientDataType(self.type_.clone()));
        }
        if self.challenge.as_bytes() != expected.challenge {
            return Err(VerifyError::Challenge);
        }
        if self.origin != expected.origin || self.cross_origin {
            return Err(VerifyError::Origin(self.origin.clone()));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AttestedCredential {
    credential_id: Vec<u8>,
    public_key: Vec<u8>,
}

#[derive(Debug)]
struct AuthenticatorData {
    rp_id_hash: [u8; 32],
    flags: u8,
    sign_count: u32,
    attested: Option<AttestedCredential>,
}

impl AuthenticatorData {
    fn parse(data: &[u8]) -> Result<Self, VerifyError> {
        if data.len() < AUTH_DATA_MIN_LEN {
            return Err(VerifyError::Malformed("authenticator data too short".into()));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&data[..32]);
        let flags = data[32];
        let sign_count = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);

        let attested = if flags & FLAG_AT != 0 {
            Some(Self::parse_attested(&data[AUTH_DATA_MIN_LEN..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested,
        })
    }

    fn parse_attested(rest: &[u8]) -> Result<AttestedCredential, VerifyError> {
        if rest.len() < ATTESTED_HEADER_LEN {
            return Err(VerifyError::Malformed("attested credential data too short".into()));
        }
        let id_len = usize::from(u16::from_be_bytes([rest[16], rest[17]]));
        let rest = &rest[ATTESTED_HEADER_LEN..];
        if rest.len() < id_len {
            return Err(VerifyError::Malformed("credential id truncated".into()));
        }
        let (credential_id, rest) = rest.split_at(id_len);

        // The COSE key is one CBOR item; extensions may follow it.
        // Decode it once to learn how many bytes it occupies.
        let mut reader = rest;
        let _: Value = ciborium::from_reader(&mut reader)
            .map_err(|e| VerifyError::Malformed(format!("credential public key: {e}")))?;
        let key_len = rest.len() - reader.len();

        Ok(AttestedCredential {
            credential_id: credential_id.to_vec(),
            public_key: rest[..key_len].to_vec(),
        })
    }

    fn check(&self, expected: &Expectations<'_>) -> Result<(), VerifyError> {
        let rp_id_hash = Sha256::digest(expected.rp_id.as_bytes());
        if self.rp_id_hash[..] != rp_id_hash[..] {
            return Err(VerifyError::RpIdHash);
        }
        if self.flags & FLAG_UP == 0 {
            return Err(VerifyError::UserNotPresent);
        }
        if expected.require_user_verification && !self.user_verified() {
            return Err(VerifyError::UserNotVerified);
        }
        Ok(())
    }

    fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }

    fn backup_eligible(&self) -> bool {
        self.flags & FLAG_BE != 0
    }

    fn backed_up(&self) -> bool {
        self.flags & FLAG_BS != 0
    }
}

/// Pull `fmt` and `authData` out of a CBOR attestation object
fn parse_attestation_object(bytes: &[u8]) -> Result<(String, Vec<u8>), VerifyError> {
    let value: Value = ciborium::from_reader(bytes)
        .map_err(|e| VerifyError::Malformed(format!("attestationObject: {e}")))?;
    let map = value
        .as_map()
        .ok_or_else(|| VerifyError::Malformed("attestationObject is not a map".into()))?;

    let mut fmt = None;
    let mut auth_data = None;
    for (key, value) in map {
        match key.as_text() {
            Some("fmt") => fmt = value.as_text().map(str::to_owned),
            Some("authData") => auth_data = value.as_bytes().cloned(),
            _ => {}
        }
    }

    match (fmt, auth_data) {
        (Some(fmt), Some(auth_data)) => Ok((fmt, auth_data)),
        _ => Err(VerifyError::Malformed("attestationObject missing fmt or authData".into())),
    }
}

fn check_credential_type(type_: &str) -> Result<(), VerifyError> {
    if type_ == PUBLIC_KEY_TYPE {
        Ok(())
    } else {
        Err(VerifyError::Malformed(format!("credential type '{type_}'")))
    }
}

/// WebAuthn verification using `ring` for signatures and `ciborium` for CBOR
#[derive(Debug, Default, Clone, Copy)]
pub struct RingVerifier;

impl AssertionVerifier for RingVerifier {
    fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &Expectations<'_>,
    ) -> Result<VerifiedRegistration, VerifyError> {
        check_credential_type(&response.type_)?;

        let client_data = ClientData::parse(&response.response.client_data_json)?;
        client_data.check("webauthn.create", expected)?;

        let (fmt, raw_auth_data) = parse_attestation_object(&response.response.attestation_object)?;
        let auth_data = AuthenticatorData::parse(&raw_auth_data)?;
        auth_data.check(expected)?;

        let attested = auth_data
            .attested
            .as_ref()
            .ok_or_else(|| VerifyError::Malformed("no attested credential data".into()))?;
        if attested.credential_id != response.raw_id.as_bytes() {
            return Err(VerifyError::CredentialId);
        }

        // Refuse keys we could never verify a login with
        CoseKey::parse(&attested.public_key)?;

        Ok(VerifiedRegistration {
            credential_id: attested.credential_id.clone(),
            public_key: attested.public_key.clone(),
            counter: auth_data.sign_count,
            device_type: if auth_data.backup_eligible() {
                DeviceType::MultiDevice
            } else {
                DeviceType::SingleDevice
            },
            backed_up: auth_data.backed_up(),
            user_verified: auth_data.user_verified(),
            attestation_format: fmt,
        })
    }

    fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        expected: &Expectations<'_>,
        stored: &Credential,
    ) -> Result<VerifiedAuthentication, VerifyError> {
        check_credential_type(&response.type_)?;
        if response.raw_id.as_bytes() != stored.credential_id.as_slice() {
            return Err(VerifyError::CredentialId);
        }

        let client_data = ClientData::parse(&response.response.client_data_json)?;
        client_data.check("webauthn.get", expected)?;

        let auth_data = AuthenticatorData::parse(&response.response.authenticator_data)?;
        auth_data.check(expected)?;

        let key = CoseKey::parse(&stored.public_key)?;
        let mut signed = response.response.authenticator_data.to_vec();
        signed.extend_from_slice(&Sha256::digest(response.response.client_data_json.as_bytes()));
        key.verify(&signed, &response.response.signature)?;

        Ok(VerifiedAuthentication {
            credential_id: stored.credential_id.clone(),
            new_counter: auth_data.sign_count,
            backed_up: auth_data.backed_up(),
            user_verified: auth_data.user_verified(),
        })
    }
}
