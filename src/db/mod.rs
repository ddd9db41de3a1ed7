//! # Credential Store
//!
//! This module organizes everything that persists identities and their
//! passkey credentials:
//! - `models`: Data structures (Identity, Credential)
//! - `memory`: In-process backend (per-identity locking)
//! - `sqlite`: SQLx/SQLite backend
//!
//! ## Why a trait?
//! The ceremonies only ever talk to `dyn CredentialStore`. Tests run against
//! the in-memory backend, the server can pick SQLite, and neither choice
//! touches ceremony logic.
//!
//! ## Invariants every backend upholds
//! - A credential id is unique across the whole store, not just per identity
//! - Lookups are scoped to one identity
//! - Counter updates follow `webauthn::counter::check` atomically
//! - Mutations for one identity never interleave and lose an update

pub mod memory;
pub mod models;
pub mod sqlite;

pub use memory::MemoryCredentialStore;
pub use models::{AuthenticatorTransport, Credential, DeviceType, Identity};
pub use sqlite::SqliteCredentialStore;

use crate::webauthn::counter::CounterRegression;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by credential store backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// `create_identity` on an id that is already present
    #[error("Identity already exists")]
    AlreadyExists,

    /// Operation referenced an identity that was never created
    #[error("Unknown identity")]
    UnknownIdentity,

    /// The credential id is already registered (to any identity)
    #[error("Credential already registered")]
    DuplicateCredential,

    /// The credential id is not registered to this identity
    #[error("Unknown credential")]
    UnknownCredential,

    /// Counter update refused by the replay policy
    #[error(transparent)]
    CounterRegression(#[from] CounterRegression),

    /// Stored data could not be mapped back into a model
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// SQLx errors from the SQLite backend
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization of stored columns
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable mapping from identities to their registered credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create a new identity; fails with `AlreadyExists` if present
    async fn create_identity(&self, id: &str) -> StoreResult<Identity>;

    /// Look up an identity
    async fn get_identity(&self, id: &str) -> StoreResult<Option<Identity>>;

    /// Attach a credential to an identity
    ///
    /// Fails with `UnknownIdentity` if the identity is absent and with
    /// `DuplicateCredential` if the credential id exists anywhere.
    async fn add_credential(&self, id: &str, credential: Credential) -> StoreResult<()>;

    /// Attach a credential only if the identity has none yet
    ///
    /// Same errors as `add_credential`, plus `AlreadyExists` when the
    /// identity already owns a credential. The check and the insert are one
    /// atomic step.
    async fn add_first_credential(&self, id: &str, credential: Credential) -> StoreResult<()>;

    /// Find one credential, scoped to the given identity
    async fn find_credential(&self, id: &str, credential_id: &[u8])
        -> StoreResult<Option<Credential>>;

    /// All credentials of an identity (empty if none or unknown)
    async fn credentials(&self, id: &str) -> StoreResult<Vec<Credential>>;

    /// Persist a new signature counter and backup state after a login
    ///
    /// The counter policy is applied here as a single atomic step so two
    /// concurrent logins cannot both advance from the same stored value.
    /// Returns the updated credential.
    async fn update_counter(
        &self,
        id: &str,
        credential_id: &[u8],
        new_counter: u32,
        backed_up: bool,
    ) -> StoreResult<Credential>;

    /// Short backend name for logging
    fn backend(&self) -> &'static str;
}
