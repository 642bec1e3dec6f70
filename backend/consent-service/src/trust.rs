//! Client-credentials trust bootstrap with the authorization server.
//!
//! [`TrustSession::establish`] performs the OAuth 2.0 client-credentials grant
//! against `{address}/oauth2/token`, prefetching a token so that bad
//! credentials or an unreachable server fail immediately. The resulting
//! session is an authenticated transport: every request carries the bearer
//! token, which is re-requested transparently once it is about to expire.
use reqwest::{Client, Response};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::IdpConfig;
use crate::error::{IdpError, Result};

/// Tokens are treated as expired this long before the server says so.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(10);

/// Slot holding the current transport, shared between the facade and the key
/// fetcher. `None` until connected and after close.
pub type SessionSlot = Arc<RwLock<Option<Arc<TrustSession>>>>;

pub struct TrustSession {
    http: Client,
    address: String,
    client_id: String,
    client_secret: String,
    token_url: String,
    scope: String,
    token: RwLock<AccessToken>,
}

struct AccessToken {
    value: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() + TOKEN_EXPIRY_SKEW < at,
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl TrustSession {
    /// Run the client-credentials grant and return the authenticated transport.
    pub async fn establish(config: &IdpConfig) -> Result<Self> {
        if config.accept_invalid_certs {
            warn!(
                address = %config.hydra_address,
                "TLS certificate verification is DISABLED for the authorization server"
            );
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        let session = Self {
            http,
            address: config.hydra_address.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: config.token_url(),
            scope: config.scopes.join(" "),
            token: RwLock::new(AccessToken {
                value: String::new(),
                expires_at: None,
            }),
        };

        // Prefetch the token: tests credentials and connectivity
        let token = session.request_token().await?;
        *session.token.write().await = token;

        info!(
            client_id = %session.client_id,
            token_url = %session.token_url,
            "Authenticated with authorization server"
        );

        Ok(session)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Authenticated `GET {address}{path}`. Non-success statuses are errors.
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.address, path);
        let token = self.bearer_token().await?;

        debug!(url = %url, "GET authorization server");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;

        Ok(response)
    }

    async fn bearer_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if token.is_fresh() {
                return Ok(token.value.clone());
            }
        }

        let mut token = self.token.write().await;
        // Another request may have refreshed it while we waited
        if !token.is_fresh() {
            debug!(client_id = %self.client_id, "Access token expired, requesting a new one");
            *token = self.request_token().await?;
        }
        Ok(token.value.clone())
    }

    async fn request_token(&self) -> Result<AccessToken> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = %status,
                client_id = %self.client_id,
                "Client credentials grant rejected"
            );
            return Err(IdpError::TokenRequest {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        if let Some(token_type) = &token.token_type {
            if !token_type.eq_ignore_ascii_case("bearer") {
                warn!(token_type = %token_type, "Unexpected token type from authorization server");
            }
        }

        Ok(AccessToken {
            value: token.access_token,
            expires_at: token_deadline(token.expires_in),
        })
    }
}

/// Deadline for a token valid `expires_in` seconds from now. A lifetime too
/// large to represent is treated as no expiry.
fn token_deadline(expires_in: Option<u64>) -> Option<Instant> {
    let secs = expires_in?;
    let deadline = Instant::now().checked_add(Duration::from_secs(secs));
    if deadline.is_none() {
        warn!(expires_in = secs, "Token lifetime out of range, treating it as non-expiring");
    }
    deadline
}
