//! # Passkey Ceremony Server
//!
//! Passwordless sign-in with WebAuthn passkeys: registration and
//! authentication ceremonies over a pluggable credential store, with
//! one-time challenges bound to the client's session.
//!
//! ## Key Concepts
//! - **WebAuthn**: Web Authentication API for passwordless authentication
//! - **Passkeys**: User-friendly implementation of WebAuthn credentials
//! - **Ceremony**: The two-step start/verify exchange that registers or
//!   uses a passkey
//!
//! The binary in `main.rs` wires these modules into an axum server.

pub mod config; // Configuration management (environment variables, settings)
pub mod db; // Credential store trait and backends
pub mod error; // Error handling and custom error types
pub mod handlers; // HTTP request handlers (routes)
pub mod middleware; // Request interceptors (authentication checks)
pub mod session; // Session view used by the ceremonies
pub mod state; // Shared application state
pub mod webauthn; // Ceremonies, challenges, verification
