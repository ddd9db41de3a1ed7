//! COSE public keys (RFC 9053) as delivered in attested credential data.
//!
//! Supported: OKP/Ed25519 (alg -8), EC2/P-256 (alg -7),
//! RSA PKCS#1 v1.5 with SHA-256 (alg -257).

use crate::webauthn::verifier::VerifyError;
use ciborium::value::Value;
use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};

pub const ALG_EDDSA: i64 = -8;
pub const ALG_ES256: i64 = -7;
pub const ALG_RS256: i64 = -257;

/// Algorithms offered in `pubKeyCredParams`, in preference order
pub const SUPPORTED_ALGORITHMS: [i64; 3] = [ALG_EDDSA, ALG_ES256, ALG_RS256];

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;

// COSE_Key map labels
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2; // also RSA n
const LABEL_Y: i64 = -3; // also RSA e

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Ed25519 { x: Vec<u8> },
    P256 { x: Vec<u8>, y: Vec<u8> },
    Rsa { n: Vec<u8>, e: Vec<u8> },
}

fn malformed(what: &str) -> VerifyError {
    VerifyError::Malformed(format!("COSE key: {what}"))
}

fn lookup(map: &[(Value, Value)], label: i64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| k.as_integer().map(i128::from) == Some(i128::from(label)))
        .map(|(_, v)| v)
}

fn int_field(map: &[(Value, Value)], label: i64, what: &str) -> Result<i64, VerifyError> {
    lookup(map, label)
        .and_then(Value::as_integer)
        .and_then(|i| i64::try_from(i).ok())
        .ok_or_else(|| malformed(what))
}

fn bytes_field(map: &[(Value, Value)], label: i64, what: &str) -> Result<Vec<u8>, VerifyError> {
    lookup(map, label)
        .and_then(Value::as_bytes)
        .cloned()
        .ok_or_else(|| malformed(what))
}

impl CoseKey {
    /// Decode COSE_Key bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, VerifyError> {
        let value: Value =
            ciborium::from_reader(bytes).map_err(|e| malformed(&e.to_string()))?;
        let map = value.as_map().ok_or_else(|| malformed("not a map"))?;

        let kty = int_field(map, LABEL_KTY, "kty")?;
        let alg = int_field(map, LABEL_ALG, "alg")?;

        match (kty, alg) {
            (KTY_OKP, ALG_EDDSA) => {
                if int_field(map, LABEL_CRV, "crv")? != CRV_ED25519 {
                    return Err(VerifyError::UnsupportedKey { kty, alg });
                }
                let x = bytes_field(map, LABEL_X, "x")?;
                if x.len() != 32 {
                    return Err(malformed("Ed25519 key length"));
                }
                Ok(CoseKey::Ed25519 { x })
            }
            (KTY_EC2, ALG_ES256) => {
                if int_field(map, LABEL_CRV, "crv")? != CRV_P256 {
                    return Err(VerifyError::UnsupportedKey { kty, alg });
                }
                let x = bytes_field(map, LABEL_X, "x")?;
                let y = bytes_field(map, LABEL_Y, "y")?;
                if x.len() != 32 || y.len() != 32 {
                    return Err(malformed("P-256 coordinate length"));
                }
                Ok(CoseKey::P256 { x, y })
            }
            (KTY_RSA, ALG_RS256) => Ok(CoseKey::Rsa {
                n: bytes_field(map, LABEL_X, "n")?,
                e: bytes_field(map, LABEL_Y, "e")?,
            }),
            _ => Err(VerifyError::UnsupportedKey { kty, alg }),
        }
    }

    /// Check `sig` over `message`
    ///
    /// ECDSA signatures are expected DER-encoded, as authenticators send them.
    pub fn verify(&self, message: &[u8], sig: &[u8]) -> Result<(), VerifyError> {
        let result = match self {
            CoseKey::Ed25519 { x } => {
                UnparsedPublicKey::new(&signature::ED25519, x).verify(message, sig)
            }
            CoseKey::P256 { x, y } => {
                // SEC1 uncompressed point: 0x04 || x || y
                let mut point = Vec::with_capacity(65);
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, &point)
                    .verify(message, sig)
            }
            CoseKey::Rsa { n, e } => RsaPublicKeyComponents { n, e }.verify(
                &signature::RSA_PKCS1_2048_8192_SHA256,
                message,
                sig,
            ),
        };
        result.map_err(|_| VerifyError::Signature)
    }
}
