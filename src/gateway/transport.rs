//! Raw platform transport: one request, one response, no retries.

use super::{ApiRequest, ApiResponse};
use crate::config::PlatformConfig;
use crate::error::TransportError;
use anyhow::Context;
use async_trait::async_trait;

/// Sends a single authorized request to the platform API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &ApiRequest,
        access_token: &str,
    ) -> Result<ApiResponse, TransportError>;
}

/// HTTP client for the platform API.
///
/// Authenticates with a Bearer token and the static `Client-Id` header.
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
    client_id: String,
}

impl HttpTransport {
    /// Create a transport for `platform.api_base_url`.
    pub fn new(platform: &PlatformConfig, client_id: String) -> anyhow::Result<Self> {
        Self::with_base_url(platform.api_base_url.clone(), client_id, platform.timeout())
    }

    /// Create a transport with a custom base URL (for testing with a mock server).
    pub fn with_base_url(
        base_url: String,
        client_id: String,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent("streamwarden/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to build platform HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        access_token: &str,
    ) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .bearer_auth(access_token)
            .header("Client-Id", &self.client_id);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(format!("Failed to read response body: {}", e)))?;

        Ok(ApiResponse { status, body })
    }
}
