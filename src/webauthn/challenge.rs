//! # Challenge Binder
//!
//! Issues one-time random challenges and binds each one to exactly one
//! identity, one ceremony kind, and one client session.
//!
//! ## Two halves
//! - The **binding** rides in the client's session. At most one per session:
//!   issuing a new one overwrites the previous.
//! - The **outstanding registry** lives here, server-side. A challenge is
//!   valid only while it is in the registry, and consuming it removes it.
//!   That removal is what makes a challenge single-use even when two verify
//!   requests race, or when an old session cookie is replayed.
//!
//! ## Lifetime
//! Challenges older than the configured TTL are rejected with `Expired`.
//! `purge_expired` drops stale registry entries left by abandoned ceremonies;
//! the server runs it on an interval.

use crate::session::{CeremonySession, SessionError};
use crate::webauthn::types::Base64Url;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Challenge size in bytes (WebAuthn asks for at least 16)
pub const CHALLENGE_LEN: usize = 32;

/// Which ceremony a challenge was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

/// What the session remembers about the in-flight ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub challenge: Base64Url,
    pub identity: String,
    pub kind: CeremonyKind,
    pub issued_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum BinderError {
    /// No binding, already consumed, wrong ceremony, or wrong identity
    #[error("Challenge mismatch")]
    Mismatch,

    /// Binding found but older than the TTL
    #[error("Challenge expired")]
    Expired,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Generate a fresh challenge from the OS random source
pub fn generate_challenge() -> Base64Url {
    let mut bytes = vec![0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut bytes);
    Base64Url(bytes)
}

#[derive(Debug)]
pub struct ChallengeBinder {
    ttl: Duration,
    /// challenge bytes -> issue time
    outstanding: Mutex<HashMap<Vec<u8>, DateTime<Utc>>>,
}

impl ChallengeBinder {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            outstanding: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Vec<u8>, DateTime<Utc>>> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a challenge for `identity` and bind it to the session
    ///
    /// Any binding already on the session is replaced and its challenge
    /// retired, so a session never has two live ceremonies.
    pub async fn issue(
        &self,
        session: &dyn CeremonySession,
        identity: &str,
        kind: CeremonyKind,
    ) -> Result<Base64Url, BinderError> {
        if let Some(previous) = session.binding().await? {
            self.registry().remove(previous.challenge.as_bytes());
        }

        let challenge = generate_challenge();
        let issued_at = Utc::now();
        self.registry().insert(challenge.to_vec(), issued_at);

        let bound = session
            .bind(Binding {
                challenge: challenge.clone(),
                identity: identity.to_string(),
                kind,
                issued_at,
            })
            .await;
        if let Err(e) = bound {
            // Nobody holds this challenge
            self.registry().remove(challenge.as_bytes());
            return Err(e.into());
        }

        tracing::debug!(identity, ?kind, "challenge issued");
        Ok(challenge)
    }

    /// Validate a session binding against the presented identity
    ///
    /// The challenge is retired from the registry whatever the outcome, so a
    /// second call with the same binding always fails with `Mismatch`.
    /// Returns the challenge the client must have signed.
    pub fn consume(
        &self,
        binding: Option<Binding>,
        kind: CeremonyKind,
        presented: &str,
    ) -> Result<Base64Url, BinderError> {
        self.consume_at(binding, kind, presented, Utc::now())
    }

    fn consume_at(
        &self,
        binding: Option<Binding>,
        kind: CeremonyKind,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<Base64Url, BinderError> {
        let binding = binding.ok_or(BinderError::Mismatch)?;

        let issued_at = self
            .registry()
            .remove(binding.challenge.as_bytes())
            .ok_or(BinderError::Mismatch)?;

        if binding.kind != kind || binding.identity != presented {
            tracing::warn!(
                bound = %binding.identity,
                presented,
                "challenge presented for a different identity or ceremony"
            );
            return Err(BinderError::Mismatch);
        }

        if now - issued_at > self.ttl {
            return Err(BinderError::Expired);
        }

        Ok(binding.challenge)
    }

    /// Drop registry entries past their TTL; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let Some(cutoff) = Utc::now().checked_sub_signed(self.ttl) else {
            return 0;
        };
        let mut registry = self.registry();
        let before = registry.len();
        registry.retain(|_, issued_at| *issued_at >= cutoff);
        before - registry.len()
    }

    /// Number of challenges currently outstanding
    pub fn outstanding(&self) -> usize {
        self.registry().len()
    }
}
