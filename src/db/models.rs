//! # Store Models
//!
//! Data structures held by the credential store. These are the backend-neutral
//! shapes; the SQLite backend maps them to and from rows in `sqlite.rs`.
//!
//! ## Key Concepts
//! - **Identity**: the user-facing key (an email address) plus the opaque
//!   user handle we hand to authenticators
//! - **Credential**: one registered passkey; an identity owns zero or more
//! - **Signature counter**: a number the authenticator bumps on every use,
//!   used to spot cloned credentials

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user account, keyed by its email address
///
/// ## Why a separate user handle?
/// WebAuthn sends `user.id` to the authenticator and gets it back as
/// `userHandle` during login. It must not be personally identifying, so we
/// generate 16 random bytes (a v4 UUID) instead of using the email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique user-facing key (email address)
    pub id: String,

    /// Opaque handle sent to authenticators as `user.id`
    pub user_handle: Vec<u8>,

    /// When the identity was created (first registration start)
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new identity with a freshly generated user handle
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_handle: Uuid::new_v4().as_bytes().to_vec(),
            created_at: Utc::now(),
        }
    }
}

/// Whether a credential is bound to one device or can be synced
///
/// Derived from the backup-eligibility (BE) flag the authenticator reports
/// at registration. Serialized the way WebAuthn libraries spell it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    SingleDevice,
    MultiDevice,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::SingleDevice => "singleDevice",
            DeviceType::MultiDevice => "multiDevice",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "singleDevice" => Some(DeviceType::SingleDevice),
            "multiDevice" => Some(DeviceType::MultiDevice),
            _ => None,
        }
    }
}

/// How the client can reach an authenticator
///
/// These hints are echoed back in `allowCredentials` so the browser can skip
/// asking for a USB key when the passkey lives on the phone. Purely
/// informational; nothing is enforced based on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    Internal,
    Hybrid,
    SmartCard,
    Cable,
}

impl AuthenticatorTransport {
    /// Parse a transport name as reported by the browser
    ///
    /// Unknown names return `None` so that newer browsers advertising a
    /// transport we do not know about don't break registration.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "usb" => Some(Self::Usb),
            "nfc" => Some(Self::Nfc),
            "ble" => Some(Self::Ble),
            "internal" => Some(Self::Internal),
            "hybrid" => Some(Self::Hybrid),
            "smart-card" => Some(Self::SmartCard),
            "cable" => Some(Self::Cable),
            _ => None,
        }
    }
}

/// Passkey credential registered to an identity
///
/// ## What is stored?
/// - **Public key**: COSE-encoded, used to check assertion signatures
/// - **Counter**: last accepted signature counter
/// - **Metadata**: device type, backup state, transport hints
///
/// ## Security Note
/// Only the PUBLIC key is stored. The private key never leaves the
/// authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Credential id assigned by the authenticator (globally unique)
    pub credential_id: Vec<u8>,

    /// COSE_Key bytes, immutable after registration
    pub public_key: Vec<u8>,

    /// Last accepted signature counter
    pub counter: u32,

    /// Single-device or multi-device (syncable)
    pub device_type: DeviceType,

    /// Whether the credential is currently backed up; may flip later
    pub backed_up: bool,

    /// Transport hints declared by the client at registration
    pub transports: Vec<AuthenticatorTransport>,

    /// When the credential was registered
    pub created_at: DateTime<Utc>,

    /// When the credential last completed an authentication
    pub last_used_at: Option<DateTime<Utc>>,
}
