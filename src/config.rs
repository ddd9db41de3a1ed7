//! # Configuration Management
//!
//! This module handles loading configuration from environment variables.
//! It uses the "12-factor app" methodology where configuration comes from the environment.
//!
//! ## Environment Variables
//! - `HOST`: Server bind address (default: 127.0.0.1)
//! - `PORT`: Server port (default: 8080)
//! - `DATABASE_URL`: SQLite connection string (sessions, and credentials when stored in SQLite)
//! - `RP_ID`: WebAuthn Relying Party ID (usually your domain)
//! - `RP_ORIGIN`: WebAuthn Relying Party Origin (full URL)
//! - `RP_NAME`: Human-readable name for your service
//! - `CREDENTIAL_STORE`: `sqlite` (default) or `memory`
//! - `CHALLENGE_TTL_SECS`: How long an issued challenge stays valid (default: 300, at most 86400)
//! - `CHALLENGE_CLEANUP_SECS`: Interval of the expired-challenge sweep (default: 600)
//! - `SESSION_IDLE_HOURS`: Session expiry on inactivity (default: 24)
//! - `CEREMONY_TIMEOUT_MS`: `timeout` hint sent to the browser (default: 60000)
//! - `ALLOW_ADDITIONAL_CREDENTIALS`: Let a signed-in user enroll more passkeys (default: true)
//! - `REQUIRE_USER_VERIFICATION`: Reject responses without the UV flag (default: false)
//! - `STATIC_DIR`: Directory served as the frontend (default: static)

use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;

/// Upper bound on `CHALLENGE_TTL_SECS` (one day)
pub const MAX_CHALLENGE_TTL_SECS: u64 = 86_400;

/// Where identities and credentials are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Durable, in the `DATABASE_URL` database
    Sqlite,
    /// Process memory; lost on restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!("unknown credential store '{}'", other)),
        }
    }
}

/// Application configuration
///
/// ## WebAuthn Terminology
/// - **RP (Relying Party)**: Your application/website that relies on authentication
/// - **RP ID**: Your domain name (e.g., "example.com" or "localhost")
/// - **RP Origin**: Full URL of your application (e.g., "https://example.com")
///
/// Browsers refuse a ceremony whose RP ID is not a registrable suffix of the
/// page's origin, and the verifier rejects responses from any other origin.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host/IP address to bind to
    pub host: String,

    /// Server port number
    pub port: u16,

    /// SQLite database connection URL
    /// The "mode=rwc" means: read, write, create if not exists
    pub database_url: String,

    /// WebAuthn Relying Party ID, without protocol or port
    pub rp_id: String,

    /// WebAuthn Relying Party Origin, with protocol (and port if non-default)
    pub rp_origin: String,

    /// Name shown to users during passkey creation
    pub rp_name: String,

    /// Credential store backend
    pub credential_store: StoreBackend,

    /// Challenge validity window in seconds
    pub challenge_ttl_secs: u64,

    /// Seconds between sweeps of abandoned challenges
    pub challenge_cleanup_secs: u64,

    /// Session expiry on inactivity, in hours
    pub session_idle_hours: i64,

    /// Ceremony timeout hint for the browser, in milliseconds
    pub ceremony_timeout_ms: u64,

    /// Whether an authenticated user may register further passkeys
    pub allow_additional_credentials: bool,

    /// Whether the UV flag is mandatory
    pub require_user_verification: bool,

    /// Frontend directory
    pub static_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "sqlite:passkey.db?mode=rwc".to_string(),
            rp_id: "localhost".to_string(),
            rp_origin: "http://localhost:8080".to_string(),
            rp_name: "Passkey Demo".to_string(),
            credential_store: StoreBackend::Sqlite,
            challenge_ttl_secs: 300,
            challenge_cleanup_secs: 600,
            session_idle_hours: 24,
            ceremony_timeout_ms: 60_000,
            allow_additional_credentials: true,
            require_user_verification: false,
            static_dir: "static".to_string(),
        }
    }
}

/// Read `key`, falling back to `default` when unset
fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` first if present, then overrides each default with the
    /// matching variable. Fails only when a variable is set but unparsable.
    pub fn from_env() -> Result<Self> {
        // dotenvy doesn't error if the file is missing
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            host: var_or("HOST", defaults.host)?,
            port: var_or("PORT", defaults.port)?,
            database_url: var_or("DATABASE_URL", defaults.database_url)?,
            rp_id: var_or("RP_ID", defaults.rp_id)?,
            rp_origin: var_or("RP_ORIGIN", defaults.rp_origin)?,
            rp_name: var_or("RP_NAME", defaults.rp_name)?,
            credential_store: var_or("CREDENTIAL_STORE", defaults.credential_store)?,
            challenge_ttl_secs: var_or("CHALLENGE_TTL_SECS", defaults.challenge_ttl_secs)?,
            challenge_cleanup_secs: var_or(
                "CHALLENGE_CLEANUP_SECS",
                defaults.challenge_cleanup_secs,
            )?,
            session_idle_hours: var_or("SESSION_IDLE_HOURS", defaults.session_idle_hours)?,
            ceremony_timeout_ms: var_or("CEREMONY_TIMEOUT_MS", defaults.ceremony_timeout_ms)?,
            allow_additional_credentials: var_or(
                "ALLOW_ADDITIONAL_CREDENTIALS",
                defaults.allow_additional_credentials,
            )?,
            require_user_verification: var_or(
                "REQUIRE_USER_VERIFICATION",
                defaults.require_user_verification,
            )?,
            static_dir: var_or("STATIC_DIR", defaults.static_dir)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Catch settings that would make every ceremony fail
    pub fn validate(&self) -> Result<()> {
        let host = self
            .rp_origin
            .split_once("://")
            .map(|(_, rest)| rest.split(['/', ':']).next().unwrap_or(""))
            .ok_or_else(|| anyhow!("RP_ORIGIN must include a scheme: '{}'", self.rp_origin))?;

        if host != self.rp_id && !host.ends_with(&format!(".{}", self.rp_id)) {
            return Err(anyhow!(
                "RP_ID '{}' is not a suffix of the RP_ORIGIN host '{}'",
                self.rp_id,
                host
            ));
        }
        if self.challenge_ttl_secs == 0 {
            return Err(anyhow!("CHALLENGE_TTL_SECS must be positive"));
        }
        if self.challenge_ttl_secs > MAX_CHALLENGE_TTL_SECS {
            return Err(anyhow!(
                "CHALLENGE_TTL_SECS must be at most {} (got {})",
                MAX_CHALLENGE_TTL_SECS,
                self.challenge_ttl_secs
            ));
        }
        Ok(())
    }

    /// Whether session cookies should carry the `Secure` attribute
    pub fn secure_cookies(&self) -> bool {
        self.rp_origin.starts_with("https://")
    }

    /// Socket address to bind the server to, e.g. "127.0.0.1:8080"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
