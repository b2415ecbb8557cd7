//! Authenticated gateway for outbound platform API calls.
//!
//! Every call goes through an explicit per-call state machine:
//!
//! ```text
//!  Authorize ──► Dispatch(Initial) ──401──► Refresh ──ok──► Dispatch(Retry) ──► final
//!                    │                         │
//!                    └── anything else ─► final └── failed ─► AuthExpired
//! ```
//!
//! The "already retried" marker is the local `Attempt` value of one
//! `call` invocation; it is never shared between calls, so a call dispatches
//! at most twice and refreshes at most once.

mod transport;


pub use transport::{HttpTransport, Transport};

use crate::credentials::{CredentialStore, TokenCipher};
use crate::error::GatewayError;
use crate::oauth::{FlightOutcome, RefreshFlights};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// A platform API request that can be sent more than once.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    /// Path appended to the API base URL (e.g. `/eventsub/subscriptions`)
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Platform API response (status + raw body).
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Which dispatch of a logical call is in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Attempt {
    Initial,
    Retry,
}

/// Wraps the raw transport with credential resolution and refresh-then-retry-once.
pub struct AuthenticatedGateway {
    store: Arc<dyn CredentialStore>,
    cipher: TokenCipher,
    transport: Arc<dyn Transport>,
    flights: Arc<RefreshFlights>,
}

impl AuthenticatedGateway {
    /// Creates a gateway.
    ///
    /// # Arguments
    /// * `store` - Credential store holding each account's encrypted tokens
    /// * `cipher` - Cipher matching the one used to write the store
    /// * `transport` - Raw platform transport (no retries of its own)
    /// * `flights` - Single-flight coordinator shared with the sign-in gate
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cipher: TokenCipher,
        transport: Arc<dyn Transport>,
        flights: Arc<RefreshFlights>,
    ) -> Self {
        Self {
            store,
            cipher,
            transport,
            flights,
        }
    }

    /// Sends `request` on behalf of `account_id`.
    ///
    /// # Returns
    /// * `Ok(ApiResponse)` - Final response, whatever its status (a 401 after
    ///   the retry is returned as-is)
    /// * `Err(MissingCredential)` - Account never connected
    /// * `Err(AuthExpired)` - Token rejected and refresh failed
    /// * `Err(Transport)` - No HTTP response (connect failure, timeout)
    pub async fn call(
        &self,
        account_id: &str,
        request: ApiRequest,
    ) -> Result<ApiResponse, GatewayError> {
        // Taken before reading credentials so a refresh that completes while
        // this request is in flight is recognised
        let ticket = self.flights.ticket(account_id).await;
        let mut access_token = self.authorize(account_id).await?;
        let mut attempt = Attempt::Initial;

        loop {
            let response = self.transport.send(&request, &access_token).await?;

            if response.status != StatusCode::UNAUTHORIZED || attempt == Attempt::Retry {
                debug!(
                    account_id = %account_id,
                    path = %request.path,
                    status = response.status.as_u16(),
                    retried = attempt == Attempt::Retry,
                    "Platform call finished"
                );
                return Ok(response);
            }

            debug!(account_id = %account_id, path = %request.path, "Access token rejected, refreshing");

            access_token = match self.flights.refresh_after_rejection(account_id, ticket).await {
                Ok(FlightOutcome::Refreshed(token)) => token,
                Ok(FlightOutcome::Joined) => self.authorize(account_id).await?,
                Err(e) => {
                    warn!(account_id = %account_id, error = %e, "Refresh failed, re-authentication required");
                    return Err(GatewayError::AuthExpired(e));
                }
            };
            attempt = Attempt::Retry;
        }
    }

    /// Resolves and decrypts the account's current access token.
    async fn authorize(&self, account_id: &str) -> Result<String, GatewayError> {
        let credential = self
            .store
            .fetch_credential(account_id)
            .await?
            .ok_or_else(|| GatewayError::MissingCredential(account_id.to_string()))?;

        Ok(self.cipher.decrypt(&credential.access_token)?)
    }
}
