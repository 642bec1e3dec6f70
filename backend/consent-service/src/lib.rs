/// Consent Service Library
///
/// Identity-provider side of the Hydra consent flow: verifies consent
/// challenges issued by the authorization server, binds them to the
/// authenticated user and signs the consent response.
///
/// ## Modules
///
/// - `challenge`: Pending consent decisions and the signed consent response
/// - `codec`: Challenge token verification
/// - `config`: Service configuration
/// - `error`: Error types
/// - `http`: axum endpoints
/// - `idp`: `IdentityProvider` facade (connect, challenges, keys, close)
/// - `keys`: Key fetching from the authorization server and the self-refreshing key cache
/// - `providers`: User authentication (HTTP Basic over htpasswd)
/// - `store`: Challenge session storage
/// - `trust`: Client-credentials transport to the authorization server
pub mod challenge;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod idp;
pub mod keys;
pub mod providers;
pub mod store;
pub mod trust;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use challenge::Challenge;
pub use config::IdpConfig;
pub use error::{IdpError, Result};
pub use idp::IdentityProvider;
pub use keys::KeyRole;
pub use store::{ChallengeStore, MemoryChallengeStore, SESSION_COOKIE_NAME};
