//! Error types for the credential lifecycle.
//!
//! The cipher, store and refresher return these typed failures unchanged;
//! only [`crate::gateway`] and [`crate::signin`] turn them into outcomes.

use reqwest::StatusCode;
use thiserror::Error;

/// Encryption failed (bad key length or AEAD failure).
#[derive(Debug, Error)]
#[error("Encryption failed: {0}")]
pub struct CipherError(pub String);

/// A stored payload could not be decrypted.
///
/// Covers tampered or corrupt ciphertext, a wrong key, and malformed or
/// missing payload fields. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionError {
    #[error("Payload field '{0}' is missing")]
    MissingField(&'static str),

    #[error("Payload field '{0}' is not valid base64")]
    InvalidEncoding(&'static str),

    #[error("Payload field '{field}' has length {actual}, expected {expected}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Authentication tag did not verify (wrong key or tampered data)")]
    TagMismatch,

    #[error("Decrypted token is not valid UTF-8")]
    InvalidUtf8,
}

/// Credential store failures.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("No credential stored for account '{0}'")]
    NotFound(String),

    #[error("Credential store error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Identity-provider failures during a token exchange.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider answered with a non-2xx status.
    #[error("Token endpoint returned {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    /// The request never reached the provider.
    #[error("Token endpoint unreachable: {0}")]
    Unreachable(String),

    /// The request may have reached the provider but no usable answer came
    /// back (timeout, truncated or unparsable body). The provider may already
    /// have rotated the refresh token.
    #[error("Token endpoint response lost: {0}")]
    ResponseLost(String),
}

impl ProviderError {
    /// True when the old refresh token may already be invalidated server-side.
    pub fn is_rotation_risk(&self) -> bool {
        matches!(self, ProviderError::ResponseLost(_))
    }
}

/// Why a refresh did not produce a new access token.
#[derive(Debug, Clone, Error)]
pub enum RefreshFailure {
    #[error("No credential stored for account")]
    MissingCredential,

    #[error("Stored refresh token could not be decrypted: {0}")]
    Decryption(#[from] DecryptionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Refreshed tokens could not be stored: {0}")]
    Store(String),
}

/// Failures surfaced by [`crate::gateway::AuthenticatedGateway::call`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The account never connected (no stored credential).
    #[error("Account '{0}' is not connected")]
    MissingCredential(String),

    /// The access token was rejected and refreshing it failed.
    /// The caller must prompt the broadcaster to re-authenticate.
    #[error("Authorization expired and could not be refreshed: {0}")]
    AuthExpired(RefreshFailure),

    #[error("Stored access token could not be decrypted: {0}")]
    Decryption(#[from] DecryptionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The platform request did not produce an HTTP response (connect failure, timeout).
#[derive(Debug, Clone, Error)]
#[error("Platform request failed: {0}")]
pub struct TransportError(pub String);

/// One or more desired subscriptions are absent after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Missing required subscriptions: {}", .missing.join(", "))]
pub struct ReconcileFailure {
    /// Subscription types that are neither present nor could be created.
    pub missing: Vec<String>,
}

/// Delegation token could not be minted.
#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("Failed to sign delegation token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Delegation token expiry is out of range")]
    ExpiryOutOfRange,
}
