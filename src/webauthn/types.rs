//! # WebAuthn API Types
//!
//! Request/response types for the ceremony endpoints and the JSON shapes the
//! browser's WebAuthn API expects. Binary fields travel as base64url strings
//! without padding, which is what `@simplewebauthn/browser` and the
//! `PublicKeyCredential.toJSON()` encoding produce.
//!
//! ## API Flow
//! Each ceremony has two steps on one endpoint, selected by `step`:
//! - `start`: server issues a challenge and returns options
//! - `verify`: client posts the authenticator's response

use crate::db::AuthenticatorTransport;
use base64::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;

/// Bytes that serialize as unpadded base64url
///
/// Deserialization also tolerates trailing `=` padding, since some clients
/// add it.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Base64Url(pub Vec<u8>);

impl Base64Url {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// Decode a base64url string, with or without padding
    pub fn decode(value: &str) -> Result<Self, base64::DecodeError> {
        BASE64_URL_SAFE_NO_PAD
            .decode(value.trim_end_matches('='))
            .map(Base64Url)
    }
}

impl From<Vec<u8>> for Base64Url {
    fn from(bytes: Vec<u8>) -> Self {
        Base64Url(bytes)
    }
}

impl From<&[u8]> for Base64Url {
    fn from(bytes: &[u8]) -> Self {
        Base64Url(bytes.to_vec())
    }
}

impl Deref for Base64Url {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Base64Url {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Base64Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE64_URL_SAFE_NO_PAD.encode(&self.0))
    }
}

// Debug prints the encoded form; raw byte vectors are unreadable in logs
impl fmt::Debug for Base64Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Base64Url({})", self)
    }
}

impl Serialize for Base64Url {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Base64Url {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Base64Url::decode(&encoded).map_err(serde::de::Error::custom)
    }
}

// ----------------------------------------------------------------------------
// HTTP request bodies
// ----------------------------------------------------------------------------

/// Body of `POST /api/register` and `POST /api/login`
///
/// ## Example JSON
/// ```json
/// { "email": "alice@example.com", "step": "start" }
/// { "email": "alice@example.com", "step": "verify", "credential": { ... } }
/// ```
///
/// ## Why serde_json::Value for the credential?
/// The ceremony parses it itself, after the bound challenge has been taken
/// out of the session. A malformed credential is then just another failed
/// verification and still burns the challenge.
#[derive(Debug, Serialize, Deserialize)]
pub struct CeremonyRequest {
    /// Identity the ceremony is for
    pub email: String,

    /// `"start"` or `"verify"`
    pub step: String,

    /// Authenticator response, only present on `verify`
    #[serde(default)]
    pub credential: serde_json::Value,
}

// ----------------------------------------------------------------------------
// Options sent to the browser
// ----------------------------------------------------------------------------

pub const PUBLIC_KEY_TYPE: &str = "public-key";

/// Relying party as shown to the authenticator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
}

/// User account as shown to the authenticator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// Opaque user handle (not the email)
    pub id: Base64Url,
    pub name: String,
    pub display_name: String,
}

/// One acceptable signature algorithm (COSE identifier)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialParameter {
    #[serde(rename = "type")]
    pub type_: String,
    pub alg: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKey {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub resident_key: ResidentKey,
    pub require_resident_key: bool,
    pub user_verification: UserVerification,
}

/// Reference to an existing credential (allow/exclude lists)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    pub id: Base64Url,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<AuthenticatorTransport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationExtensions {
    /// Ask the client to report whether a discoverable credential was made
    pub cred_props: bool,
}

/// Options for `navigator.credentials.create()`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub challenge: Base64Url,
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<CredentialParameter>,
    pub timeout: u64,
    /// Always `"none"`: attestation statements are not evaluated
    pub attestation: String,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
    pub extensions: RegistrationExtensions,
}

/// Options for `navigator.credentials.get()`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: Base64Url,
    pub timeout: u64,
    pub rp_id: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: UserVerification,
}

// ----------------------------------------------------------------------------
// Responses posted back by the browser
// ----------------------------------------------------------------------------

/// `response` member of a registration credential
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Base64Url,
    pub attestation_object: Base64Url,
    /// `getTransports()` as reported by the client (informational)
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Result of `navigator.credentials.create()`, JSON-encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: Base64Url,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AttestationResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
}

impl RegistrationResponse {
    /// Transport hints we recognise, duplicates removed
    pub fn transports(&self) -> Vec<AuthenticatorTransport> {
        let mut transports = Vec::new();
        for name in &self.response.transports {
            if let Some(t) = AuthenticatorTransport::parse(name) {
                if !transports.contains(&t) {
                    transports.push(t);
                }
            }
        }
        transports
    }
}

/// `response` member of an authentication credential
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Base64Url,
    pub authenticator_data: Base64Url,
    pub signature: Base64Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<Base64Url>,
}

/// Result of `navigator.credentials.get()`, JSON-encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub id: String,
    pub raw_id: Base64Url,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AssertionResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base64url_accepts_padding() {
        let plain: Base64Url = serde_json::from_value(json!("AQI")).unwrap();
        let padded: Base64Url = serde_json::from_value(json!("AQI=")).unwrap();
        assert_eq!(plain.as_bytes(), &[1, 2]);
        assert_eq!(plain, padded);
        assert_eq!(serde_json::to_value(&plain).unwrap(), json!("AQI"));
    }

    #[test]
    fn base64url_rejects_standard_alphabet() {
        assert!(serde_json::from_value::<Base64Url>(json!("+/+/")).is_err());
    }

    #[test]
    fn registration_response_parses_browser_json() {
        let response: RegistrationResponse = serde_json::from_value(json!({
            "id": "AQID",
            "rawId": "AQID",
            "type": "public-key",
            "response": {
                "clientDataJSON": "e30",
                "attestationObject": "oA",
                "transports": ["internal", "hybrid", "internal", "carrier-pigeon"]
            },
            "clientExtensionResults": {},
            "authenticatorAttachment": "platform"
        }))
        .unwrap();

        assert_eq!(response.raw_id.as_bytes(), &[1, 2, 3]);
        assert_eq!(
            response.transports(),
            vec![AuthenticatorTransport::Internal, AuthenticatorTransport::Hybrid]
        );
    }

    #[test]
    fn descriptor_omits_empty_transports() {
        let descriptor = CredentialDescriptor {
            id: Base64Url(vec![9]),
            type_: PUBLIC_KEY_TYPE.to_string(),
            transports: vec![],
        };
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({ "id": "CQ", "type": "public-key" })
        );
    }
}
