//! Configuration management for the consent service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! # Example
//!
//! ```no_run
//! use consent_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Authorization server: {}", settings.hydra.address);
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Scopes requested in the client-credentials grant.
pub const DEFAULT_SCOPES: &[&str] = &["core", "hydra.keys.get"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub hydra: HydraSettings,
    pub key_cache: KeyCacheSettings,
    pub challenge: ChallengeSettings,
    pub basic_auth: BasicAuthSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Load settings from environment variables (and `.env` in debug builds)
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            hydra: HydraSettings::from_env()?,
            key_cache: KeyCacheSettings::from_env()?,
            challenge: ChallengeSettings::from_env()?,
            basic_auth: BasicAuthSettings::from_env()?,
            server: ServerSettings::from_env()?,
        })
    }

    /// Core configuration consumed by [`IdentityProvider`](crate::IdentityProvider).
    pub fn idp_config(&self) -> IdpConfig {
        IdpConfig {
            client_id: self.hydra.client_id.clone(),
            client_secret: self.hydra.client_secret.clone(),
            hydra_address: self.hydra.address.clone(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            accept_invalid_certs: self.hydra.accept_invalid_certs,
            request_timeout: Duration::from_secs(self.hydra.request_timeout_secs),
            key_cache_expiration: Duration::from_secs(self.key_cache.expiration_secs),
            key_cache_cleanup_interval: Duration::from_secs(self.key_cache.cleanup_interval_secs),
            challenge_session_ttl: Duration::from_secs(self.challenge.session_ttl_secs),
            consent_token_ttl: Duration::from_secs(self.challenge.consent_token_ttl_secs),
        }
    }
}

/// Authorization server (Hydra) connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct HydraSettings {
    pub address: String,
    pub client_id: String,
    pub client_secret: String,
    /// Skip TLS certificate verification. Only for self-signed development setups.
    pub accept_invalid_certs: bool,
    pub request_timeout_secs: u64,
}

impl HydraSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            address: env::var("HYDRA_ADDRESS").context("HYDRA_ADDRESS must be set")?,
            client_id: env::var("HYDRA_CLIENT_ID").context("HYDRA_CLIENT_ID must be set")?,
            client_secret: env::var("HYDRA_CLIENT_SECRET")
                .context("HYDRA_CLIENT_SECRET must be set")?,
            accept_invalid_certs: env::var("HYDRA_ACCEPT_INVALID_CERTS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("Invalid HYDRA_ACCEPT_INVALID_CERTS")?,
            request_timeout_secs: env::var("HYDRA_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid HYDRA_REQUEST_TIMEOUT_SECS")?,
        })
    }
}

impl fmt::Debug for HydraSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HydraSettings")
            .field("address", &self.address)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Key cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyCacheSettings {
    pub expiration_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl KeyCacheSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            expiration_secs: env::var("KEY_CACHE_EXPIRATION_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid KEY_CACHE_EXPIRATION_SECS")?,
            cleanup_interval_secs: env::var("KEY_CACHE_CLEANUP_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid KEY_CACHE_CLEANUP_INTERVAL_SECS")?,
        })
    }
}

/// Challenge session and consent token lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeSettings {
    pub session_ttl_secs: u64,
    pub consent_token_ttl_secs: u64,
}

impl ChallengeSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            session_ttl_secs: env::var("CHALLENGE_SESSION_TTL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .context("Invalid CHALLENGE_SESSION_TTL_SECS")?,
            consent_token_ttl_secs: env::var("CONSENT_TOKEN_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid CONSENT_TOKEN_TTL_SECS")?,
        })
    }
}

/// Basic authentication provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuthSettings {
    pub htpasswd_file: String,
    pub realm: String,
}

impl BasicAuthSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            htpasswd_file: env::var("HTPASSWD_FILE").context("HTPASSWD_FILE must be set")?,
            realm: env::var("BASIC_AUTH_REALM").unwrap_or_else(|_| "consent".to_string()),
        })
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,
        })
    }
}

/// Configuration of the identity provider core.
#[derive(Clone)]
pub struct IdpConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Base address of the authorization server, e.g. `https://hydra:4444`.
    pub hydra_address: String,
    pub scopes: Vec<String>,
    pub accept_invalid_certs: bool,
    pub request_timeout: Duration,
    /// Default TTL of cached keys.
    pub key_cache_expiration: Duration,
    /// How often expired keys are swept (and refreshed).
    pub key_cache_cleanup_interval: Duration,
    pub challenge_session_ttl: Duration,
    pub consent_token_ttl: Duration,
}

impl IdpConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        hydra_address: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            hydra_address: hydra_address.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            accept_invalid_certs: false,
            request_timeout: Duration::from_secs(10),
            key_cache_expiration: Duration::from_secs(300),
            key_cache_cleanup_interval: Duration::from_secs(30),
            challenge_session_ttl: Duration::from_secs(600),
            consent_token_ttl: Duration::from_secs(300),
        }
    }

    pub(crate) fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.hydra_address.trim_end_matches('/'))
    }
}

impl fmt::Debug for IdpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdpConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("hydra_address", &self.hydra_address)
            .field("scopes", &self.scopes)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("request_timeout", &self.request_timeout)
            .field("key_cache_expiration", &self.key_cache_expiration)
            .field("key_cache_cleanup_interval", &self.key_cache_cleanup_interval)
            .field("challenge_session_ttl", &self.challenge_session_ttl)
            .field("consent_token_ttl", &self.consent_token_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_required_env() {
        env::set_var("HYDRA_ADDRESS", "https://hydra.local:4444/");
        env::set_var("HYDRA_CLIENT_ID", "idp");
        env::set_var("HYDRA_CLIENT_SECRET", "s3cret");
        env::set_var("HTPASSWD_FILE", "/etc/idp/htpasswd");
    }

    fn clear_env() {
        for var in [
            "HYDRA_ADDRESS",
            "HYDRA_CLIENT_ID",
            "HYDRA_CLIENT_SECRET",
            "HYDRA_ACCEPT_INVALID_CERTS",
            "KEY_CACHE_EXPIRATION_SECS",
            "HTPASSWD_FILE",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        set_required_env();

        let settings = Settings::load().unwrap();
        assert!(!settings.hydra.accept_invalid_certs);
        assert_eq!(settings.key_cache.expiration_secs, 300);
        assert_eq!(settings.basic_auth.realm, "consent");

        let config = settings.idp_config();
        assert_eq!(config.scopes, vec!["core", "hydra.keys.get"]);
        assert_eq!(config.token_url(), "https://hydra.local:4444/oauth2/token");
        assert_eq!(config.key_cache_expiration, Duration::from_secs(300));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_client_secret() {
        clear_env();
        set_required_env();
        env::remove_var("HYDRA_CLIENT_SECRET");

        let err = Settings::load().unwrap_err();
        assert!(err.to_string().contains("HYDRA_CLIENT_SECRET"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_ttl() {
        clear_env();
        set_required_env();
        env::set_var("KEY_CACHE_EXPIRATION_SECS", "five minutes");

        assert!(Settings::load().is_err());
        clear_env();
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = IdpConfig::new("idp", "s3cret", "https://hydra.local");
        let printed = format!("{:?}", config);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("s3cret"));
    }
}
