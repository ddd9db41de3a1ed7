//! In-memory credential store.
//!
//! Identities live in a map of per-identity mutexes so mutations for one
//! identity are serialized while different identities proceed in parallel.
//! A separate owner index enforces store-wide credential id uniqueness.
//!
//! Lock order is always `owners` before an identity record.

use super::{Credential, CredentialStore, Identity, StoreError, StoreResult};
use crate::webauthn::counter;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

#[derive(Debug)]
struct IdentityRecord {
    identity: Identity,
    credentials: Vec<Credential>,
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    identities: RwLock<HashMap<String, Arc<Mutex<IdentityRecord>>>>,
    /// credential id -> owning identity
    owners: Mutex<HashMap<Vec<u8>, String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, id: &str, credential: Credential, first_only: bool) -> StoreResult<()> {
        let record = self.record(id).ok_or(StoreError::UnknownIdentity)?;

        let mut owners = lock(&self.owners);
        if owners.contains_key(&credential.credential_id) {
            return Err(StoreError::DuplicateCredential);
        }

        let mut record = lock(&record);
        if first_only && !record.credentials.is_empty() {
            return Err(StoreError::AlreadyExists);
        }
        owners.insert(credential.credential_id.clone(), id.to_string());
        record.credentials.push(credential);
        Ok(())
    }

    fn record(&self, id: &str) -> Option<Arc<Mutex<IdentityRecord>>> {
        self.identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_identity(&self, id: &str) -> StoreResult<Identity> {
        let mut identities = self
            .identities
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if identities.contains_key(id) {
            return Err(StoreError::AlreadyExists);
        }

        let identity = Identity::new(id);
        identities.insert(
            id.to_string(),
            Arc::new(Mutex::new(IdentityRecord {
                identity: identity.clone(),
                credentials: Vec::new(),
            })),
        );
        Ok(identity)
    }

    async fn get_identity(&self, id: &str) -> StoreResult<Option<Identity>> {
        Ok(self.record(id).map(|record| {
            let record = lock(&record);
            record.identity.clone()
        }))
    }

    async fn add_credential(&self, id: &str, credential: Credential) -> StoreResult<()> {
        self.insert(id, credential, false)
    }

    async fn add_first_credential(&self, id: &str, credential: Credential) -> StoreResult<()> {
        self.insert(id, credential, true)
    }

    async fn find_credential(
        &self,
        id: &str,
        credential_id: &[u8],
    ) -> StoreResult<Option<Credential>> {
        let Some(record) = self.record(id) else {
            return Ok(None);
        };
        let record = lock(&record);
        Ok(record
            .credentials
            .iter()
            .find(|c| c.credential_id == credential_id)
            .cloned())
    }

    async fn credentials(&self, id: &str) -> StoreResult<Vec<Credential>> {
        Ok(self
            .record(id)
            .map(|record| {
                let record = lock(&record);
                record.credentials.clone()
            })
            .unwrap_or_default())
    }

    async fn update_counter(
        &self,
        id: &str,
        credential_id: &[u8],
        new_counter: u32,
        backed_up: bool,
    ) -> StoreResult<Credential> {
        let record = self.record(id).ok_or(StoreError::UnknownCredential)?;
        let mut record = lock(&record);
        let credential = record
            .credentials
            .iter_mut()
            .find(|c| c.credential_id == credential_id)
            .ok_or(StoreError::UnknownCredential)?;

        credential.counter = counter::check(credential.counter, new_counter)?;
        credential.backed_up = backed_up;
        credential.last_used_at = Some(Utc::now());
        Ok(credential.clone())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
