//! # Application State
//!
//! Shared state handed to every request handler and ceremony.
//!
//! ## The State Pattern
//! Instead of creating resources per request, we:
//! 1. Create them once at startup
//! 2. Store them in AppState behind `Arc`
//! 3. Axum clones the state for each request (cheap: only pointers are copied)
//!
//! The three collaborators (store, binder, verifier) are trait objects or
//! plain structs chosen at startup, so tests can assemble an `AppState` from
//! in-memory parts without a database.

use crate::config::{Config, StoreBackend};
use crate::db::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
use crate::webauthn::challenge::ChallengeBinder;
use crate::webauthn::ring_verifier::RingVerifier;
use crate::webauthn::verifier::{AssertionVerifier, Expectations};
use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Identities and credentials
    pub store: Arc<dyn CredentialStore>,

    /// Issues and tracks one-time challenges
    pub binder: Arc<ChallengeBinder>,

    /// Signature/attestation verification primitive
    pub verifier: Arc<dyn AssertionVerifier>,

    /// Relying party settings and ceremony policy
    pub config: Arc<Config>,
}

impl AppState {
    /// Assemble state from already-built parts
    pub fn new(
        config: Config,
        store: Arc<dyn CredentialStore>,
        verifier: Arc<dyn AssertionVerifier>,
    ) -> Self {
        let ttl = i64::try_from(config.challenge_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);
        AppState {
            store,
            binder: Arc::new(ChallengeBinder::new(ttl)),
            verifier,
            config: Arc::new(config),
        }
    }

    /// Production state: configured store backend and the ring verifier
    pub fn from_config(config: Config, pool: &SqlitePool) -> Self {
        let store: Arc<dyn CredentialStore> = match config.credential_store {
            StoreBackend::Sqlite => Arc::new(SqliteCredentialStore::new(pool.clone())),
            StoreBackend::Memory => Arc::new(MemoryCredentialStore::new()),
        };
        tracing::info!(backend = store.backend(), "credential store ready");

        AppState::new(config, store, Arc::new(RingVerifier))
    }

    /// What a response for `challenge` must match
    pub fn expectations<'a>(&'a self, challenge: &'a [u8]) -> Expectations<'a> {
        Expectations {
            challenge,
            origin: &self.config.rp_origin,
            rp_id: &self.config.rp_id,
            require_user_verification: self.config.require_user_verification,
        }
    }
}

/// Connect to the database and run migrations
///
/// The `sqlx::migrate!` macro embeds the files under `./migrations` at
/// compile time; applied migrations are tracked and not re-run.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePool::connect(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_ttl(challenge_ttl_secs: u64) -> AppState {
        let config = Config {
            challenge_ttl_secs,
            ..Config::default()
        };
        AppState::new(config, Arc::new(MemoryCredentialStore::new()), Arc::new(RingVerifier))
    }

    #[test]
    fn challenge_ttl_comes_from_config() {
        assert_eq!(state_with_ttl(300).binder.ttl(), chrono::Duration::seconds(300));
    }

    #[test]
    fn oversized_ttl_saturates() {
        for secs in [u64::MAX, i64::MAX as u64] {
            let ttl = state_with_ttl(secs).binder.ttl();
            assert!(ttl > chrono::Duration::zero());
            assert_eq!(ttl, chrono::Duration::MAX);
        }
    }
}
