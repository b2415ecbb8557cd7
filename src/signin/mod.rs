//! Sign-in orchestration.
//!
//! Runs once per successful provider authentication callback, in order:
//!
//! 1. Persist the freshly issued tokens (overwriting any prior credential)
//! 2. Reconcile the account's event subscriptions
//! 3. Check eligibility: verified email, then allow-list membership
//! 4. Mint a delegation token
//!
//! Every failure is a distinct [`DenialReason`] with a machine-readable code.

pub mod delegation;


pub use delegation::{DelegationClaims, DelegationSigner};

use crate::config::EligibilityConfig;
use crate::credentials::{CredentialStore, CredentialUpdate, TokenCipher};
use crate::error::StoreError;
use crate::eventsub::SubscriptionReconciler;
use crate::oauth::RefreshFlights;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Tokens and identity handed over by the provider's authentication callback.
#[derive(Clone)]
pub struct SignInRequest {
    pub account_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for SignInRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInRequest")
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .field("email_verified", &self.email_verified)
            .finish_non_exhaustive()
    }
}

/// Why a sign-in was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenialReason {
    #[error("Provider tokens could not be stored")]
    CredentialsNotStored,

    #[error("Missing required subscriptions: {}", .types.join(", "))]
    MissingSubscriptions { types: Vec<String> },

    #[error("Email address is missing or not verified")]
    EmailNotVerified,

    #[error("Account is not on the allow-list")]
    NotAllowListed,

    #[error("Allow-list lookup failed")]
    EligibilityUnavailable,

    #[error("Delegation token could not be signed")]
    DelegationUnavailable,
}

impl DenialReason {
    /// Stable identifier for callers and UIs.
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::CredentialsNotStored => "credentials_not_stored",
            DenialReason::MissingSubscriptions { .. } => "missing_required_subscriptions",
            DenialReason::EmailNotVerified => "email_not_verified",
            DenialReason::NotAllowListed => "not_allow_listed",
            DenialReason::EligibilityUnavailable => "eligibility_unavailable",
            DenialReason::DelegationUnavailable => "delegation_unavailable",
        }
    }
}

/// Terminal result of a sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    Allowed { delegation_token: String },
    Denied(DenialReason),
}

impl SignInOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SignInOutcome::Allowed { .. })
    }
}

/// Allow-list lookup by account email.
#[async_trait]
pub trait AllowList: Send + Sync {
    async fn is_allowed(&self, email: &str) -> anyhow::Result<bool>;
}

/// Fixed allow-list compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticAllowList {
    emails: HashSet<String>,
}

impl StaticAllowList {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &EligibilityConfig) -> Self {
        Self::new(&config.allowed_emails)
    }
}

#[async_trait]
impl AllowList for StaticAllowList {
    async fn is_allowed(&self, email: &str) -> anyhow::Result<bool> {
        Ok(self.emails.contains(&email.trim().to_lowercase()))
    }
}

/// Decides whether an authenticated broadcaster may sign in.
pub struct SignInGate {
    store: Arc<dyn CredentialStore>,
    cipher: TokenCipher,
    flights: Arc<RefreshFlights>,
    reconciler: Arc<SubscriptionReconciler>,
    allow_list: Arc<dyn AllowList>,
    signer: DelegationSigner,
}

impl SignInGate {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cipher: TokenCipher,
        flights: Arc<RefreshFlights>,
        reconciler: Arc<SubscriptionReconciler>,
        allow_list: Arc<dyn AllowList>,
        signer: DelegationSigner,
    ) -> Self {
        Self {
            store,
            cipher,
            flights,
            reconciler,
            allow_list,
            signer,
        }
    }

    pub async fn sign_in(&self, request: SignInRequest) -> SignInOutcome {
        let account_id = request.account_id.as_str();

        match self.sign_in_steps(&request).await {
            Ok(delegation_token) => {
                info!(account_id = %account_id, "Sign-in allowed");
                SignInOutcome::Allowed { delegation_token }
            }
            Err(reason) => {
                warn!(account_id = %account_id, code = reason.code(), reason = %reason, "Sign-in denied");
                SignInOutcome::Denied(reason)
            }
        }
    }

    async fn sign_in_steps(&self, request: &SignInRequest) -> Result<String, DenialReason> {
        let account_id = request.account_id.as_str();

        self.persist_tokens(request).await?;

        self.reconciler
            .reconcile(account_id)
            .await
            .map_err(|failure| DenialReason::MissingSubscriptions {
                types: failure.missing,
            })?;

        let email = match (&request.email, request.email_verified) {
            (Some(email), true) if !email.trim().is_empty() => email.as_str(),
            _ => return Err(DenialReason::EmailNotVerified),
        };

        match self.allow_list.is_allowed(email).await {
            Ok(true) => {}
            Ok(false) => return Err(DenialReason::NotAllowListed),
            Err(e) => {
                error!(account_id = %account_id, error = %e, "Allow-list lookup failed");
                return Err(DenialReason::EligibilityUnavailable);
            }
        }

        self.signer.mint(account_id, email).map_err(|e| {
            error!(account_id = %account_id, error = %e, "Failed to mint delegation token");
            DenialReason::DelegationUnavailable
        })
    }

    /// Overwrites the stored credential under the account's refresh guard.
    async fn persist_tokens(&self, request: &SignInRequest) -> Result<(), DenialReason> {
        let account_id = request.account_id.as_str();

        let encrypt = |token: &str| {
            self.cipher.encrypt(token).map_err(|e| {
                error!(account_id = %account_id, error = %e, "Failed to encrypt provider tokens");
                DenialReason::CredentialsNotStored
            })
        };
        let access = encrypt(&request.access_token)?;
        let refresh = encrypt(&request.refresh_token)?;

        let store = Arc::clone(&self.store);
        self.flights
            .exclusive(account_id, || async move {
                store
                    .update_credential(account_id, CredentialUpdate::both(access, refresh))
                    .await
            })
            .await
            .map_err(|e: StoreError| {
                error!(account_id = %account_id, error = %e, "Failed to store provider tokens");
                DenialReason::CredentialsNotStored
            })
    }
}
