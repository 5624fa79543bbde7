//! Secret handling for broker credentials
//!
//! API keys, secrets and OAuth tokens are held in `Zeroizing<String>` so they are
//! wiped from memory on drop. Nothing in this module ever formats a full secret:
//! `Debug` output and log lines only show the first four characters.

use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

/// Error type for secret loading operations
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Secret validation failed: {0}")]
    ValidationFailed(String),
}

/// Show the first four characters of a key followed by `***`
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{}***", prefix)
}

/// Load a secret through a variable lookup (usually the process environment).
///
/// Empty values are treated as unset, matching how a blank `.env` entry behaves.
pub fn load_secret<F>(name: &str, lookup: &F) -> Result<Zeroizing<String>, SecretError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => {
            debug!("Loaded secret {} ({})", name, mask_key(&value));
            Ok(Zeroizing::new(value.trim().to_string()))
        }
        _ => Err(SecretError::EnvVarNotSet(name.to_string())),
    }
}

/// Key id / secret pair used by Alpaca
#[derive(Clone)]
pub struct ApiCredentials {
    key_id: Zeroizing<String>,
    secret: Zeroizing<String>,
}

impl ApiCredentials {
    pub fn new(key_id: &str, secret: &str) -> Result<Self, SecretError> {
        if key_id.is_empty() {
            return Err(SecretError::ValidationFailed("API key is empty".to_string()));
        }
        if secret.is_empty() {
            return Err(SecretError::ValidationFailed(
                "API secret is empty".to_string(),
            ));
        }
        Ok(Self {
            key_id: Zeroizing::new(key_id.to_string()),
            secret: Zeroizing::new(secret.to_string()),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn masked_key(&self) -> String {
        mask_key(&self.key_id)
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("key_id", &self.masked_key())
            .field("secret", &"***")
            .finish()
    }
}
