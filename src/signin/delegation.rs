//! Delegation token minting.
//!
//! The token is an HS256 JWT asserting `{sub, email, role, exp}` for
//! downstream authorization systems. Verification is their concern; this
//! module only signs.

use crate::config::DelegationConfig;
use crate::error::DelegationError;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// Upper bound on a token lifetime (ten years)
const MAX_TTL_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// Claims carried by a delegation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationClaims {
    /// Platform account id
    pub sub: String,
    pub email: String,
    pub role: String,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// Signs delegation tokens with a shared HMAC secret.
pub struct DelegationSigner {
    key: EncodingKey,
    role: String,
    ttl: Duration,
}

impl std::fmt::Debug for DelegationSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationSigner")
            .field("role", &self.role)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl DelegationSigner {
    pub fn new(secret: &str, config: &DelegationConfig) -> anyhow::Result<Self> {
        if secret.is_empty() {
            anyhow::bail!("Delegation secret must not be empty");
        }
        if config.ttl_seconds <= 0 {
            anyhow::bail!("Delegation ttl_seconds must be positive, got {}", config.ttl_seconds);
        }
        if config.ttl_seconds > MAX_TTL_SECONDS {
            anyhow::bail!(
                "Delegation ttl_seconds must be at most {}, got {}",
                MAX_TTL_SECONDS,
                config.ttl_seconds
            );
        }
        let ttl = Duration::try_seconds(config.ttl_seconds)
            .ok_or_else(|| anyhow::anyhow!("Delegation ttl_seconds out of range"))?;

        Ok(Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            role: config.role.clone(),
            ttl,
        })
    }

    /// Mints a token for `account_id` expiring one ttl from now.
    pub fn mint(&self, account_id: &str, email: &str) -> Result<String, DelegationError> {
        let claims = DelegationClaims {
            sub: account_id.to_string(),
            email: email.to_string(),
            role: self.role.clone(),
            exp: Utc::now()
                .checked_add_signed(self.ttl)
                .ok_or(DelegationError::ExpiryOutOfRange)?
                .timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    fn config(role: &str, ttl_seconds: i64) -> DelegationConfig {
        DelegationConfig {
            role: role.to_string(),
            ttl_seconds,
        }
    }

    #[test]
    fn test_mint_and_verify() {
        let signer = DelegationSigner::new("shared-secret", &config("broadcaster", 3600)).unwrap();
        let token = signer.mint("141981764", "streamer@example.com").unwrap();

        let decoded = decode::<DelegationClaims>(
            &token,
            &DecodingKey::from_secret(b"shared-secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();

        assert_eq!(decoded.header.alg, Algorithm::HS256);
        assert_eq!(decoded.claims.sub, "141981764");
        assert_eq!(decoded.claims.email, "streamer@example.com");
        assert_eq!(decoded.claims.role, "broadcaster");

        let remaining = decoded.claims.exp - Utc::now().timestamp();
        assert!((3590..=3600).contains(&remaining), "remaining = {}", remaining);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = DelegationSigner::new("shared-secret", &config("user", 60)).unwrap();
        let token = signer.mint("1", "a@example.com").unwrap();

        let result = decode::<DelegationClaims>(
            &token,
            &DecodingKey::from_secret(b"other-secret"),
            &Validation::new(Algorithm::HS256),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_signer_config() {
        assert!(DelegationSigner::new("", &config("user", 60)).is_err());
        assert!(DelegationSigner::new("secret", &config("user", 0)).is_err());
    }

    #[test]
    fn test_oversized_ttl_rejected_at_construction() {
        assert!(DelegationSigner::new("secret", &config("user", 10_000_000_000_000)).is_err());
        assert!(DelegationSigner::new("secret", &config("user", i64::MAX)).is_err());
        assert!(DelegationSigner::new("secret", &config("user", MAX_TTL_SECONDS)).is_ok());
    }

    #[test]
    fn test_unrepresentable_expiry_is_an_error() {
        let signer = DelegationSigner {
            key: EncodingKey::from_secret(b"secret"),
            role: "user".to_string(),
            ttl: Duration::try_days(100_000_000).unwrap(),
        };

        assert!(matches!(
            signer.mint("1", "a@example.com"),
            Err(DelegationError::ExpiryOutOfRange)
        ));
    }
}
