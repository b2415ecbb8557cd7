//! Encrypted credential storage using SQLite.
//!
//! Stores the access/refresh token triples for each broadcaster account.
//! Values arrive already encrypted; this layer never sees plaintext.

use super::{Credential, CredentialStore, CredentialUpdate, EncryptedPayload};
use crate::error::StoreError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     account_id TEXT PRIMARY KEY,
///     access_token_cipher TEXT NOT NULL,
///     access_token_iv TEXT NOT NULL,
///     access_token_tag TEXT NOT NULL,
///     refresh_token_cipher TEXT NOT NULL,
///     refresh_token_iv TEXT NOT NULL,
///     refresh_token_tag TEXT NOT NULL,
///     created_at TEXT NOT NULL,         -- ISO 8601 timestamp
///     updated_at TEXT NOT NULL          -- ISO 8601 timestamp
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in a Mutex, so every read and write is serialised
///   (reads always observe the last completed write)
/// - Each update is a single statement, so a triple is never half-written
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                account_id TEXT PRIMARY KEY,
                access_token_cipher TEXT NOT NULL,
                access_token_iv TEXT NOT NULL,
                access_token_tag TEXT NOT NULL,
                refresh_token_cipher TEXT NOT NULL,
                refresh_token_iv TEXT NOT NULL,
                refresh_token_tag TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create credentials table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("credential store lock poisoned".to_string()))
    }

    /// Deletes the credential for an account (disconnect).
    ///
    /// # Returns
    /// * `Ok(true)` - Credential deleted
    /// * `Ok(false)` - No credential found
    pub fn delete_credential(&self, account_id: &str) -> Result<bool, StoreError> {
        let rows_affected = self.conn()?.execute(
            "DELETE FROM credentials WHERE account_id = ?1",
            params![account_id],
        )?;

        Ok(rows_affected > 0)
    }

    /// Lists every account with a stored credential.
    pub fn list_accounts(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT account_id FROM credentials ORDER BY account_id")?;

        let accounts = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(accounts)
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn fetch_credential(&self, account_id: &str) -> Result<Option<Credential>, StoreError> {
        let conn = self.conn()?;
        let credential = conn
            .query_row(
                r#"
                SELECT access_token_cipher, access_token_iv, access_token_tag,
                       refresh_token_cipher, refresh_token_iv, refresh_token_tag
                FROM credentials
                WHERE account_id = ?1
                "#,
                params![account_id],
                |row| {
                    Ok(Credential {
                        account_id: account_id.to_string(),
                        access_token: EncryptedPayload {
                            ciphertext: row.get(0)?,
                            iv: row.get(1)?,
                            auth_tag: row.get(2)?,
                        },
                        refresh_token: EncryptedPayload {
                            ciphertext: row.get(3)?,
                            iv: row.get(4)?,
                            auth_tag: row.get(5)?,
                        },
                    })
                },
            )
            .optional()?;

        Ok(credential)
    }

    async fn update_credential(
        &self,
        account_id: &str,
        update: CredentialUpdate,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;

        match (update.access_token, update.refresh_token) {
            (Some(access), Some(refresh)) => {
                // Upsert both triples in one statement
                conn.execute(
                    r#"
                    INSERT INTO credentials (
                        account_id,
                        access_token_cipher, access_token_iv, access_token_tag,
                        refresh_token_cipher, refresh_token_iv, refresh_token_tag,
                        created_at, updated_at
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                    ON CONFLICT(account_id) DO UPDATE SET
                        access_token_cipher = excluded.access_token_cipher,
                        access_token_iv = excluded.access_token_iv,
                        access_token_tag = excluded.access_token_tag,
                        refresh_token_cipher = excluded.refresh_token_cipher,
                        refresh_token_iv = excluded.refresh_token_iv,
                        refresh_token_tag = excluded.refresh_token_tag,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        account_id,
                        access.ciphertext,
                        access.iv,
                        access.auth_tag,
                        refresh.ciphertext,
                        refresh.iv,
                        refresh.auth_tag,
                        now,
                    ],
                )?;
            }
            (Some(access), None) => {
                let rows = conn.execute(
                    r#"
                    UPDATE credentials SET
                        access_token_cipher = ?2,
                        access_token_iv = ?3,
                        access_token_tag = ?4,
                        updated_at = ?5
                    WHERE account_id = ?1
                    "#,
                    params![account_id, access.ciphertext, access.iv, access.auth_tag, now],
                )?;
                if rows == 0 {
                    return Err(StoreError::NotFound(account_id.to_string()));
                }
            }
            (None, Some(refresh)) => {
                let rows = conn.execute(
                    r#"
                    UPDATE credentials SET
                        refresh_token_cipher = ?2,
                        refresh_token_iv = ?3,
                        refresh_token_tag = ?4,
                        updated_at = ?5
                    WHERE account_id = ?1
                    "#,
                    params![account_id, refresh.ciphertext, refresh.iv, refresh.auth_tag, now],
                )?;
                if rows == 0 {
                    return Err(StoreError::NotFound(account_id.to_string()));
                }
            }
            (None, None) => {}
        }

        debug!(account_id = %account_id, "Credential updated");
        Ok(())
    }
}
