pub mod secrets;
pub use secrets::Secrets;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Complete streamwarden configuration.
///
/// Holds everything except secrets, which are read from the environment by
/// [`Secrets::from_env`] and never from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamwardenConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub eventsub: EventSubConfig,
    #[serde(default)]
    pub delegation: DelegationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub eligibility: EligibilityConfig,
}

/// Identity provider (token endpoint) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// OAuth token exchange endpoint URL
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// OAuth client ID (also sent as the platform's Client-Id header)
    #[serde(default)]
    pub client_id: String,
    /// Upper bound on one token exchange round trip (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_token_url() -> String {
    "https://id.twitch.tv/oauth2/token".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            client_id: String::new(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Platform API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Base URL every API path is appended to
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Upper bound on one API request (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_api_base_url() -> String {
    "https://api.twitch.tv/helix".to_string()
}

impl PlatformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Event subscription delivery configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventSubConfig {
    /// Conduit that created subscriptions deliver to
    #[serde(default)]
    pub conduit_id: String,
}

/// Delegation token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DelegationConfig {
    /// Role claim granted to signed-in broadcasters
    #[serde(default = "default_role")]
    pub role: String,
    /// Token lifetime; matches the outer session lifetime (seconds, at most ten years)
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: i64,
}

fn default_role() -> String {
    "user".to_string()
}

fn default_ttl_seconds() -> i64 {
    30 * 24 * 60 * 60
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("streamwarden.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Sign-in eligibility configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EligibilityConfig {
    /// Emails allowed to sign in (compared case-insensitively)
    #[serde(default)]
    pub allowed_emails: Vec<String>,
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<StreamwardenConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path))?;
    let config: StreamwardenConfig =
        toml::from_str(&contents).context("Failed to parse config file")?;
    Ok(config)
}
