//! Remote endpoint configuration
//!
//! Public endpoint values required to reach the remote document store.
//! Secret credentials never live here; the opaque user identifier comes
//! from the authentication collaborator.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming the document store base URL
pub const ENV_API_URL: &str = "TAKA_API_URL";
/// Environment variable naming the document collection
pub const ENV_COLLECTION: &str = "TAKA_COLLECTION";

pub const DEFAULT_COLLECTION: &str = "ledgers";

/// Validated remote document store endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    base_url: String,
    collection: String,
}

impl RemoteConfig {
    /// Build a config, validating the URL scheme and trimming noise
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Result<Self> {
        let base_url = required_value(&base_url.into(), "remote base URL")?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidInput(
                "remote base URL must include http:// or https://".to_string(),
            ));
        }

        let collection = required_value(&collection.into(), "remote collection")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            collection,
        })
    }

    /// Read configuration from `TAKA_API_URL` / `TAKA_COLLECTION`
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(ENV_API_URL)
            .map_err(|_| Error::InvalidInput(format!("{ENV_API_URL} is not set")))?;
        let collection =
            std::env::var(ENV_COLLECTION).unwrap_or_else(|_| DEFAULT_COLLECTION.to_string());
        Self::new(base_url, collection)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

/// Trim a required setting, rejecting blank values with a named error
fn required_value(raw: &str, name: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{name} must not be empty")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_trailing_slash() {
        let config = RemoteConfig::new("https://api.example.com/", "ledgers").unwrap();
        assert_eq!(config.base_url(), "https://api.example.com");
        assert_eq!(config.collection(), "ledgers");
    }

    #[test]
    fn new_rejects_invalid_values() {
        assert!(RemoteConfig::new("", "ledgers").is_err());
        assert!(RemoteConfig::new("api.example.com", "ledgers").is_err());
        assert!(RemoteConfig::new("https://api.example.com", "   ").is_err());
    }
}
