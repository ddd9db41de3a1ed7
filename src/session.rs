//! # Ceremony Session
//!
//! The per-client session carries two things for us:
//! - the in-flight ceremony binding (challenge + identity), and
//! - the identity the client has authenticated as, once login succeeds.
//!
//! Ceremonies only see the `CeremonySession` trait. In the server it is
//! implemented on `tower_sessions::Session` (cookie id, data in SQLite);
//! tests use `MemorySession`.

use crate::webauthn::challenge::Binding;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tower_sessions::Session;

/// Session key holding the current ceremony binding
const CEREMONY_KEY: &str = "ceremony";
/// Session key holding the authenticated identity
const IDENTITY_KEY: &str = "email";

/// Failure of the underlying session transport
#[derive(Error, Debug)]
#[error("Session error: {0}")]
pub struct SessionError(pub String);

impl From<tower_sessions::session::Error> for SessionError {
    fn from(e: tower_sessions::session::Error) -> Self {
        SessionError(e.to_string())
    }
}

/// Key/value view of a client session, as the ceremonies need it
#[async_trait]
pub trait CeremonySession: Send + Sync {
    /// Current binding, left in place
    async fn binding(&self) -> Result<Option<Binding>, SessionError>;

    /// Replace the binding
    async fn bind(&self, binding: Binding) -> Result<(), SessionError>;

    /// Remove and return the binding
    async fn take_binding(&self) -> Result<Option<Binding>, SessionError>;

    /// Identity this session has authenticated as
    async fn identity(&self) -> Result<Option<String>, SessionError>;

    /// Mark the session as authenticated
    async fn authenticate(&self, identity: &str) -> Result<(), SessionError>;

    /// Drop everything (logout)
    async fn destroy(&self) -> Result<(), SessionError>;
}

#[async_trait]
impl CeremonySession for Session {
    async fn binding(&self) -> Result<Option<Binding>, SessionError> {
        Ok(self.get::<Binding>(CEREMONY_KEY).await?)
    }

    async fn bind(&self, binding: Binding) -> Result<(), SessionError> {
        Ok(self.insert(CEREMONY_KEY, binding).await?)
    }

    async fn take_binding(&self) -> Result<Option<Binding>, SessionError> {
        Ok(self.remove::<Binding>(CEREMONY_KEY).await?)
    }

    async fn identity(&self) -> Result<Option<String>, SessionError> {
        Ok(self.get::<String>(IDENTITY_KEY).await?)
    }

    async fn authenticate(&self, identity: &str) -> Result<(), SessionError> {
        // New session id on privilege change (session fixation)
        self.cycle_id().await?;
        Ok(self.insert(IDENTITY_KEY, identity).await?)
    }

    async fn destroy(&self) -> Result<(), SessionError> {
        Ok(self.flush().await?)
    }
}

#[derive(Debug, Default)]
struct SessionData {
    binding: Option<Binding>,
    identity: Option<String>,
}

/// Session kept in process memory
///
/// Used by tests and anywhere the ceremonies run without an HTTP layer.
#[derive(Debug, Default)]
pub struct MemorySession {
    data: Mutex<SessionData>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut SessionData) -> T) -> T {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut data)
    }
}

#[async_trait]
impl CeremonySession for MemorySession {
    async fn binding(&self) -> Result<Option<Binding>, SessionError> {
        Ok(self.with(|d| d.binding.clone()))
    }

    async fn bind(&self, binding: Binding) -> Result<(), SessionError> {
        self.with(|d| d.binding = Some(binding));
        Ok(())
    }

    async fn take_binding(&self) -> Result<Option<Binding>, SessionError> {
        Ok(self.with(|d| d.binding.take()))
    }

    async fn identity(&self) -> Result<Option<String>, SessionError> {
        Ok(self.with(|d| d.identity.clone()))
    }

    async fn authenticate(&self, identity: &str) -> Result<(), SessionError> {
        self.with(|d| d.identity = Some(identity.to_string()));
        Ok(())
    }

    async fn destroy(&self) -> Result<(), SessionError> {
        self.with(|d| *d = SessionData::default());
        Ok(())
    }
}
