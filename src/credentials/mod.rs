//! Encrypted credential storage for broadcaster OAuth tokens.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  TokenRefresher / SignInGate             │
//! │  - only writers of credential rows       │
//! └─────────────────────────────────────────┘
//!          ↓ encrypt            ↑ decrypt
//! ┌─────────────────────────────────────────┐
//! │       TokenCipher                        │
//! │  - AES-256-GCM                           │
//! │  - Fresh 12-byte IV per token            │
//! │  - Ciphertext / IV / tag kept separate   │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore (trait)            │
//! │  - fetch_credential / update_credential  │
//! │  - SqliteCredentialStore implementation  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use streamwarden::credentials::{
//!     CredentialStore, CredentialUpdate, SqliteCredentialStore, TokenCipher,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let cipher = TokenCipher::from_base64_key(&std::env::var("STREAMWARDEN_ENCRYPTION_KEY")?)?;
//! let store = SqliteCredentialStore::new("credentials.db")?;
//!
//! let update = CredentialUpdate::both(cipher.encrypt("access")?, cipher.encrypt("refresh")?);
//! store.update_credential("12826", update).await?;
//!
//! if let Some(credential) = store.fetch_credential("12826").await? {
//!     let access_token = cipher.decrypt(&credential.access_token)?;
//!     println!("token length {}", access_token.len());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod cipher;
mod storage;

pub use cipher::{TokenCipher, IV_SIZE, KEY_SIZE, TAG_SIZE};
pub use storage::SqliteCredentialStore;

/// One encrypted token: ciphertext, IV and GCM tag, each base64-encoded.
///
/// Only produced by [`TokenCipher::encrypt`] and only consumed by
/// [`TokenCipher::decrypt`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

/// Stored credential for one broadcaster account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    /// Platform user id of the broadcaster (primary key)
    pub account_id: String,

    /// Current access token triple
    pub access_token: EncryptedPayload,

    /// Current refresh token triple
    pub refresh_token: EncryptedPayload,
}

/// Replacement triples for an account.
///
/// A triple is always written whole; there is no way to express a
/// partial triple update.
#[derive(Clone, Debug, Default)]
pub struct CredentialUpdate {
    pub access_token: Option<EncryptedPayload>,
    pub refresh_token: Option<EncryptedPayload>,
}

impl CredentialUpdate {
    /// Replaces both triples.
    pub fn both(access_token: EncryptedPayload, refresh_token: EncryptedPayload) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
        }
    }
}

/// Keyed store of encrypted credentials.
///
/// Reads and writes for a single account must be sequentially consistent:
/// a completed `update_credential` is visible to the next `fetch_credential`.
/// Each triple in an update is written atomically.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the credential for `account_id`, or `None` if the account never connected.
    async fn fetch_credential(&self, account_id: &str) -> Result<Option<Credential>, StoreError>;

    /// Replaces the triples present in `update`.
    ///
    /// Creating a row requires both triples; updating one triple of a
    /// missing row fails with [`StoreError::NotFound`].
    async fn update_credential(
        &self,
        account_id: &str,
        update: CredentialUpdate,
    ) -> Result<(), StoreError>;
}
