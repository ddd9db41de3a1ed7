//! # SQLite Credential Store
//!
//! CRUD operations for identities and passkey credentials on top of a SQLx
//! connection pool. Schema lives in `migrations/`.
//!
//! ## Concurrency
//! Every mutation is a single statement, so SQLite's own write lock
//! serializes them. The counter policy is folded into the `UPDATE`'s `WHERE`
//! clause, which makes check-and-set atomic without an explicit transaction.
//!
//! ## Storage Format
//! Timestamps are RFC3339 text, transports a JSON array of strings, byte
//! strings are BLOBs.

use super::models::{AuthenticatorTransport, Credential, DeviceType, Identity};
use super::{CredentialStore, StoreError, StoreResult};
use crate::webauthn::counter::CounterRegression;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Row shape of the `identities` table
#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    id: String,
    user_handle: Vec<u8>,
    created_at: String,
}

/// Row shape of the `credentials` table
#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    credential_id: Vec<u8>,
    public_key: Vec<u8>,
    counter: i64,
    device_type: String,
    backed_up: bool,
    transports: String,
    created_at: String,
    last_used_at: Option<String>,
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt(format!("invalid timestamp '{}'", value)))
}

impl TryFrom<IdentityRow> for Identity {
    type Error = StoreError;

    fn try_from(row: IdentityRow) -> StoreResult<Self> {
        Ok(Identity {
            id: row.id,
            user_handle: row.user_handle,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> StoreResult<Self> {
        let counter = u32::try_from(row.counter)
            .map_err(|_| StoreError::Corrupt(format!("counter out of range: {}", row.counter)))?;
        let device_type = DeviceType::parse(&row.device_type)
            .ok_or_else(|| StoreError::Corrupt(format!("device type '{}'", row.device_type)))?;

        // Transports are stored as plain strings; drop any we no longer know
        let names: Vec<String> = serde_json::from_str(&row.transports)?;
        let transports = names
            .iter()
            .filter_map(|name| AuthenticatorTransport::parse(name))
            .collect();

        Ok(Credential {
            credential_id: row.credential_id,
            public_key: row.public_key,
            counter,
            device_type,
            backed_up: row.backed_up,
            transports,
            created_at: parse_timestamp(&row.created_at)?,
            last_used_at: row
                .last_used_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Wrap an already-migrated pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_credential(
        &self,
        id: &str,
        credential_id: &[u8],
    ) -> StoreResult<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT credential_id, public_key, counter, device_type, backed_up, transports, created_at, last_used_at
             FROM credentials
             WHERE identity_id = ? AND credential_id = ?",
        )
        .bind(id)
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Credential::try_from).transpose()
    }

    /// Insert a credential row
    ///
    /// With `first_only` the row is written only while the identity owns no
    /// credential; the `NOT EXISTS` guard keeps check and insert in one
    /// statement.
    async fn insert(&self, id: &str, credential: &Credential, first_only: bool) -> StoreResult<()> {
        // Identities are never deleted, so checking first cannot go stale
        if self.get_identity(id).await?.is_none() {
            return Err(StoreError::UnknownIdentity);
        }

        let transports_json = serde_json::to_string(&credential.transports)?;
        let guard = if first_only {
            "WHERE NOT EXISTS (SELECT 1 FROM credentials WHERE identity_id = ?)"
        } else {
            ""
        };
        let sql = format!(
            "INSERT INTO credentials
             (credential_id, identity_id, public_key, counter, device_type, backed_up, transports, created_at)
             SELECT ?, ?, ?, ?, ?, ?, ?, ? {guard}"
        );

        let mut query = sqlx::query(&sql)
            .bind(&credential.credential_id)
            .bind(id)
            .bind(&credential.public_key)
            .bind(i64::from(credential.counter))
            .bind(credential.device_type.as_str())
            .bind(credential.backed_up)
            .bind(transports_json)
            .bind(credential.created_at.to_rfc3339());
        if first_only {
            query = query.bind(id);
        }

        let result = query.execute(&self.pool).await.map_err(|e| {
            // credential_id is the primary key: a collision means it is
            // registered somewhere already, possibly to another identity
            if is_unique_violation(&e) {
                StoreError::DuplicateCredential
            } else {
                StoreError::Database(e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn create_identity(&self, id: &str) -> StoreResult<Identity> {
        let identity = Identity::new(id);

        sqlx::query("INSERT INTO identities (id, user_handle, created_at) VALUES (?, ?, ?)")
            .bind(&identity.id)
            .bind(&identity.user_handle)
            .bind(identity.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::AlreadyExists
                } else {
                    StoreError::Database(e)
                }
            })?;

        Ok(identity)
    }

    async fn get_identity(&self, id: &str) -> StoreResult<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(
            "SELECT id, user_handle, created_at FROM identities WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn add_credential(&self, id: &str, credential: Credential) -> StoreResult<()> {
        self.insert(id, &credential, false).await
    }

    async fn add_first_credential(&self, id: &str, credential: Credential) -> StoreResult<()> {
        self.insert(id, &credential, true).await
    }

    async fn find_credential(
        &self,
        id: &str,
        credential_id: &[u8],
    ) -> StoreResult<Option<Credential>> {
        self.fetch_credential(id, credential_id).await
    }

    async fn credentials(&self, id: &str) -> StoreResult<Vec<Credential>> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            "SELECT credential_id, public_key, counter, device_type, backed_up, transports, created_at, last_used_at
             FROM credentials
             WHERE identity_id = ?
             ORDER BY created_at",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Credential::try_from).collect()
    }

    async fn update_counter(
        &self,
        id: &str,
        credential_id: &[u8],
        new_counter: u32,
        backed_up: bool,
    ) -> StoreResult<Credential> {
        let now = Utc::now().to_rfc3339();

        // Same rule as webauthn::counter::check, evaluated by SQLite
        let result = sqlx::query(
            "UPDATE credentials
             SET counter = ?, backed_up = ?, last_used_at = ?
             WHERE identity_id = ? AND credential_id = ? AND (counter = 0 OR counter < ?)",
        )
        .bind(i64::from(new_counter))
        .bind(backed_up)
        .bind(&now)
        .bind(id)
        .bind(credential_id)
        .bind(i64::from(new_counter))
        .execute(&self.pool)
        .await?;

        let current = self
            .fetch_credential(id, credential_id)
            .await?
            .ok_or(StoreError::UnknownCredential)?;

        if result.rows_affected() == 0 {
            return Err(CounterRegression {
                stored: current.counter,
                reported: new_counter,
            }
            .into());
        }

        Ok(current)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
