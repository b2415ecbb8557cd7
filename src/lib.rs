//! Credential lifecycle and authenticated platform gateway for a streaming
//! channel dashboard.
//!
//! Stores each broadcaster's OAuth token pair encrypted at rest, attaches a
//! valid access token to every outbound platform call (refreshing and
//! retrying once on expiry), and on sign-in makes sure the account's event
//! subscriptions exist before issuing a delegation token.

// Configuration and out-of-band secrets
pub mod config;

// Encrypted credential storage
pub mod credentials;

// Error taxonomy
pub mod error;

// Event subscription reconciliation
pub mod eventsub;

// Authenticated platform API calls
pub mod gateway;

// Token refresh and single-flight coordination
pub mod oauth;

// Sign-in orchestration and delegation tokens
pub mod signin;

use anyhow::{Context, Result};
use config::{Secrets, StreamwardenConfig};
use credentials::{CredentialStore, SqliteCredentialStore, TokenCipher};
use eventsub::SubscriptionReconciler;
use gateway::{AuthenticatedGateway, HttpTransport};
use oauth::{RefreshFlights, TokenRefresher};
use signin::{DelegationSigner, SignInGate, StaticAllowList};
use std::sync::Arc;
use tracing::info;

/// Fully wired components sharing one store, cipher and refresh coordinator.
pub struct Streamwarden {
    pub store: Arc<SqliteCredentialStore>,
    pub gateway: Arc<AuthenticatedGateway>,
    pub reconciler: Arc<SubscriptionReconciler>,
    pub sign_in: SignInGate,
}

impl Streamwarden {
    /// Builds every component from configuration and secrets.
    pub fn from_config(config: &StreamwardenConfig, secrets: &Secrets) -> Result<Self> {
        if config.provider.client_id.is_empty() {
            anyhow::bail!("provider.client_id must be set");
        }
        if config.eventsub.conduit_id.is_empty() {
            anyhow::bail!("eventsub.conduit_id must be set");
        }

        let cipher = TokenCipher::from_base64_key(&secrets.encryption_key)
            .context("Invalid token encryption key")?;

        let store = Arc::new(
            SqliteCredentialStore::new(&config.storage.db_path)
                .context("Failed to initialize credential store")?,
        );
        let dyn_store: Arc<dyn CredentialStore> = store.clone();

        let refresher = TokenRefresher::new(
            Arc::clone(&dyn_store),
            cipher.clone(),
            &config.provider,
            secrets.client_secret.clone(),
        )?;
        let flights = Arc::new(RefreshFlights::new(Arc::new(refresher)));

        let transport = HttpTransport::new(&config.platform, config.provider.client_id.clone())?;
        let gateway = Arc::new(AuthenticatedGateway::new(
            Arc::clone(&dyn_store),
            cipher.clone(),
            Arc::new(transport),
            Arc::clone(&flights),
        ));

        let reconciler = Arc::new(SubscriptionReconciler::new(
            Arc::clone(&gateway),
            config.eventsub.conduit_id.clone(),
        ));

        let signer = DelegationSigner::new(&secrets.delegation_secret, &config.delegation)?;
        let allow_list = Arc::new(StaticAllowList::from_config(&config.eligibility));

        let sign_in = SignInGate::new(
            dyn_store,
            cipher,
            flights,
            Arc::clone(&reconciler),
            allow_list,
            signer,
        );

        info!(
            db_path = %config.storage.db_path.display(),
            api_base_url = %config.platform.api_base_url,
            allow_listed = config.eligibility.allowed_emails.len(),
            "Streamwarden initialized"
        );

        Ok(Self {
            store,
            gateway,
            reconciler,
            sign_in,
        })
    }
}
