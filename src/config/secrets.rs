use anyhow::{anyhow, Result};

pub const ENCRYPTION_KEY_VAR: &str = "STREAMWARDEN_ENCRYPTION_KEY";
pub const CLIENT_SECRET_VAR: &str = "STREAMWARDEN_CLIENT_SECRET";
pub const DELEGATION_SECRET_VAR: &str = "STREAMWARDEN_DELEGATION_SECRET";

/// Out-of-band secrets. Never read from the config file.
#[derive(Clone)]
pub struct Secrets {
    /// Base64-encoded 32-byte token encryption key
    pub encryption_key: String,
    /// OAuth client secret for the token endpoint
    pub client_secret: String,
    /// HMAC key for delegation tokens
    pub delegation_secret: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("encryption_key", &"<redacted>")
            .field("client_secret", &"<redacted>")
            .field("delegation_secret", &"<redacted>")
            .finish()
    }
}

impl Secrets {
    /// Build from env vars. Every secret is required.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{} must be set", name))
        };

        Ok(Self {
            encryption_key: required(ENCRYPTION_KEY_VAR)?,
            client_secret: required(CLIENT_SECRET_VAR)?,
            delegation_secret: required(DELEGATION_SECRET_VAR)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_all_secrets_present() {
        let env = vars(&[
            (ENCRYPTION_KEY_VAR, "a2V5"),
            (CLIENT_SECRET_VAR, "shh"),
            (DELEGATION_SECRET_VAR, "hmac"),
        ]);

        let secrets = Secrets::from_lookup(|name| env.get(name).cloned()).unwrap();
        assert_eq!(secrets.client_secret, "shh");
        assert_eq!(secrets.delegation_secret, "hmac");
    }

    #[test]
    fn test_missing_secret_is_named() {
        let env = vars(&[(ENCRYPTION_KEY_VAR, "a2V5"), (CLIENT_SECRET_VAR, "  ")]);

        let err = Secrets::from_lookup(|name| env.get(name).cloned()).unwrap_err();
        assert!(err.to_string().contains(CLIENT_SECRET_VAR));
    }

    #[test]
    fn test_debug_redacts() {
        let env = vars(&[
            (ENCRYPTION_KEY_VAR, "a2V5"),
            (CLIENT_SECRET_VAR, "super-secret-value"),
            (DELEGATION_SECRET_VAR, "hmac"),
        ]);

        let secrets = Secrets::from_lookup(|name| env.get(name).cloned()).unwrap();
        assert!(!format!("{:?}", secrets).contains("super-secret-value"));
    }
}
