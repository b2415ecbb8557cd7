//! OAuth refresh-token exchange.
//!
//! Exchanges the stored refresh token for a new access/refresh pair and
//! persists both, re-encrypted, in a single store update.

use crate::config::ProviderConfig;
use crate::credentials::{CredentialStore, CredentialUpdate, TokenCipher};
use crate::error::{ProviderError, RefreshFailure};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Produces a new access token for an account.
///
/// The gateway depends on this trait rather than on [`TokenRefresher`]
/// directly so the retry path can be exercised without an identity provider.
#[async_trait]
pub trait TokenRefresh: Send + Sync {
    /// Refreshes the account's tokens and returns the new access token.
    ///
    /// Stored state is only mutated after a fully successful round trip.
    async fn refresh(&self, account_id: &str) -> Result<String, RefreshFailure>;
}

/// Token response from the identity provider (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Refreshes tokens against the identity provider's token endpoint.
pub struct TokenRefresher {
    store: Arc<dyn CredentialStore>,
    cipher: TokenCipher,
    http_client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl TokenRefresher {
    /// Creates a refresher.
    ///
    /// # Arguments
    /// * `store` - Credential store read for the refresh token and written with the new pair
    /// * `cipher` - Same cipher the sign-in path uses
    /// * `provider` - Token endpoint, client id and request timeout
    /// * `client_secret` - OAuth client secret (from the environment)
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cipher: TokenCipher,
        provider: &ProviderConfig,
        client_secret: String,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(provider.timeout())
            .build()
            .context("Failed to build token endpoint HTTP client")?;

        Ok(Self {
            store,
            cipher,
            http_client,
            token_url: provider.token_url.clone(),
            client_id: provider.client_id.clone(),
            client_secret,
        })
    }

    async fn exchange(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_builder() {
                    ProviderError::Unreachable(e.to_string())
                } else {
                    ProviderError::ResponseLost(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(ProviderError::Rejected { status, body });
        }

        let token_response = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| ProviderError::ResponseLost(format!("unreadable token response: {}", e)))?;

        if token_response.access_token.is_empty() {
            return Err(ProviderError::ResponseLost(
                "token response has an empty access_token".to_string(),
            ));
        }
        if token_response.refresh_token.as_deref() == Some("") {
            return Err(ProviderError::ResponseLost(
                "token response has an empty refresh_token".to_string(),
            ));
        }

        Ok(token_response)
    }
}

#[async_trait]
impl TokenRefresh for TokenRefresher {
    async fn refresh(&self, account_id: &str) -> Result<String, RefreshFailure> {
        let credential = self
            .store
            .fetch_credential(account_id)
            .await
            .map_err(|e| RefreshFailure::Store(e.to_string()))?
            .ok_or(RefreshFailure::MissingCredential)?;

        let refresh_token = self.cipher.decrypt(&credential.refresh_token).map_err(|e| {
            warn!(account_id = %account_id, error = %e, "Stored refresh token failed to decrypt");
            RefreshFailure::Decryption(e)
        })?;

        info!(account_id = %account_id, "Refreshing OAuth token");

        let token_response = match self.exchange(&refresh_token).await {
            Ok(response) => response,
            Err(e) if e.is_rotation_risk() => {
                warn!(
                    account_id = %account_id,
                    error = %e,
                    rotation_risk = true,
                    "Token refresh response lost; provider may have rotated the refresh token"
                );
                return Err(e.into());
            }
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "Token refresh failed");
                return Err(e.into());
            }
        };

        debug!(
            account_id = %account_id,
            rotated = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            token_type = ?token_response.token_type,
            "Token exchange successful"
        );

        // Keep the existing refresh token if the provider did not rotate it
        let new_refresh_token = token_response.refresh_token.unwrap_or(refresh_token);

        let update = CredentialUpdate::both(
            self.cipher
                .encrypt(&token_response.access_token)
                .map_err(|e| RefreshFailure::Store(e.to_string()))?,
            self.cipher
                .encrypt(&new_refresh_token)
                .map_err(|e| RefreshFailure::Store(e.to_string()))?,
        );

        self.store
            .update_credential(account_id, update)
            .await
            .map_err(|e| {
                error!(account_id = %account_id, error = %e, "Failed to persist refreshed credentials");
                RefreshFailure::Store(e.to_string())
            })?;

        info!(account_id = %account_id, "OAuth token refreshed successfully");

        Ok(token_response.access_token)
    }
}
