//! Shared helpers for the integration tests
//!
//! `SoftAuthenticator` plays the browser plus a P-256 platform
//! authenticator: it builds `clientDataJSON`, authenticator data and
//! attestation objects the way a real one would and signs with `ring`.

#![allow(dead_code)]

use ciborium::value::Value as Cbor;
use passkey_ceremony::config::{Config, StoreBackend};
use passkey_ceremony::db::MemoryCredentialStore;
use passkey_ceremony::state::AppState;
use passkey_ceremony::webauthn::ring_verifier::RingVerifier;
use passkey_ceremony::webauthn::types::Base64Url;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const RP_ID: &str = "example.com";
pub const ORIGIN: &str = "https://login.example.com";

// UP | UV | BE | BS
pub const FLAGS: u8 = 0x01 | 0x04 | 0x08 | 0x10;
const FLAG_AT: u8 = 0x40;

pub fn config() -> Config {
    Config {
        rp_id: RP_ID.to_string(),
        rp_origin: ORIGIN.to_string(),
        credential_store: StoreBackend::Memory,
        ..Config::default()
    }
}

/// In-memory state with the real verifier
pub fn app_state() -> AppState {
    AppState::new(
        config(),
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(RingVerifier),
    )
}

fn b64(bytes: &[u8]) -> String {
    Base64Url::from(bytes).to_string()
}

/// Pull `challenge` out of an options JSON
pub fn challenge_of(options: &Value) -> String {
    options["challenge"]
        .as_str()
        .expect("options carry a challenge")
        .to_string()
}

pub struct SoftAuthenticator {
    key: EcdsaKeyPair,
    rng: SystemRandom,
    pub credential_id: Vec<u8>,
    pub origin: String,
    pub rp_id: String,
}

impl SoftAuthenticator {
    pub fn new(credential_id: &[u8]) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("generate P-256 key");
        let key = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
            .expect("load P-256 key");
        Self {
            key,
            rng,
            credential_id: credential_id.to_vec(),
            origin: ORIGIN.to_string(),
            rp_id: RP_ID.to_string(),
        }
    }

    /// COSE_Key for the public half (EC2, ES256, P-256)
    pub fn cose_key(&self) -> Vec<u8> {
        // SEC1 uncompressed: 0x04 || x || y
        let point = self.key.public_key().as_ref();
        let map = Cbor::Map(vec![
            (Cbor::Integer(1.into()), Cbor::Integer(2.into())),
            (Cbor::Integer(3.into()), Cbor::Integer((-7).into())),
            (Cbor::Integer((-1).into()), Cbor::Integer(1.into())),
            (Cbor::Integer((-2).into()), Cbor::Bytes(point[1..33].to_vec())),
            (Cbor::Integer((-3).into()), Cbor::Bytes(point[33..65].to_vec())),
        ]);
        let mut out = Vec::new();
        ciborium::into_writer(&map, &mut out).expect("encode COSE key");
        out
    }

    fn client_data(&self, type_: &str, challenge: &str) -> Vec<u8> {
        json!({
            "type": type_,
            "challenge": challenge,
            "origin": self.origin,
            "crossOrigin": false
        })
        .to_string()
        .into_bytes()
    }

    fn auth_data(&self, flags: u8, counter: u32) -> Vec<u8> {
        let mut data = Sha256::digest(self.rp_id.as_bytes()).to_vec();
        data.push(flags);
        data.extend_from_slice(&counter.to_be_bytes());
        data
    }

    /// Answer a `navigator.credentials.create()` call
    pub fn register(&self, challenge: &str, counter: u32) -> Value {
        let mut auth_data = self.auth_data(FLAGS | FLAG_AT, counter);
        auth_data.extend_from_slice(&[0u8; 16]); // aaguid
        auth_data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&self.cose_key());

        let attestation = Cbor::Map(vec![
            (Cbor::Text("fmt".into()), Cbor::Text("none".into())),
            (Cbor::Text("attStmt".into()), Cbor::Map(vec![])),
            (Cbor::Text("authData".into()), Cbor::Bytes(auth_data)),
        ]);
        let mut attestation_object = Vec::new();
        ciborium::into_writer(&attestation, &mut attestation_object)
            .expect("encode attestation object");

        let id = b64(&self.credential_id);
        json!({
            "id": id,
            "rawId": id,
            "type": "public-key",
            "response": {
                "clientDataJSON": b64(&self.client_data("webauthn.create", challenge)),
                "attestationObject": b64(&attestation_object),
                "transports": ["internal", "hybrid"]
            },
            "authenticatorAttachment": "platform",
            "clientExtensionResults": { "credProps": { "rk": true } }
        })
    }

    /// Answer a `navigator.credentials.get()` call, reporting `counter`
    pub fn assert(&self, challenge: &str, counter: u32) -> Value {
        self.assert_with_flags(challenge, counter, FLAGS)
    }

    pub fn assert_with_flags(&self, challenge: &str, counter: u32, flags: u8) -> Value {
        let client_data = self.client_data("webauthn.get", challenge);
        let auth_data = self.auth_data(flags, counter);

        let mut signed = auth_data.clone();
        signed.extend_from_slice(&Sha256::digest(&client_data));
        let signature = self.key.sign(&self.rng, &signed).expect("sign assertion");

        let id = b64(&self.credential_id);
        json!({
            "id": id,
            "rawId": id,
            "type": "public-key",
            "response": {
                "clientDataJSON": b64(&client_data),
                "authenticatorData": b64(&auth_data),
                "signature": b64(signature.as_ref())
            }
        })
    }
}
