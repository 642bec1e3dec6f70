/// HTTP Basic authentication against an htpasswd-style file
///
/// ## File format
///
/// One `user:hash` entry per line. Blank lines and lines starting with `#`
/// are ignored. The hash format is whatever the configured
/// [`PasswordVerifier`] understands (Argon2 PHC strings by default).
///
/// The default verifier only accepts Argon2. Entries written by `htpasswd`
/// itself (bcrypt `$2y$`, APR1-MD5 `$apr1$`, `{SHA}`) never authenticate and
/// have to be regenerated as Argon2 PHC strings, or checked by a custom
/// [`PasswordVerifier`].
///
/// ## Security
///
/// - Unknown users are still run through a full verification against a dummy
///   hash, so response timing does not reveal which user names exist
/// - Every failure collapses into `AuthenticationFailure`
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString},
    Argon2,
};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::Provider;
use crate::error::{IdpError, Result};

/// Checks a password against a stored hash.
pub trait PasswordVerifier: Send + Sync {
    /// `hash` is `None` for unknown users; implementations must still spend
    /// comparable time and return `false`.
    fn verify(&self, password: &str, hash: Option<&str>) -> bool;
}

/// Argon2 PHC-string verification.
pub struct Argon2Verifier {
    dummy_hash: String,
}

impl Argon2Verifier {
    pub fn new() -> Result<Self> {
        let salt = SaltString::from_b64("ZHVtbXlzYWx0ZHVtbXlzYWx0")
            .map_err(|e| IdpError::PasswordHash(format!("dummy salt: {}", e)))?;
        let dummy_hash = Argon2::default()
            .hash_password(b"not-a-real-password", &salt)
            .map_err(|e| IdpError::PasswordHash(format!("dummy hash: {}", e)))?
            .to_string();
        Ok(Self { dummy_hash })
    }

    fn verify_phc(password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                debug!(error = %e, "Unparseable password hash");
                false
            }
        }
    }
}

impl PasswordVerifier for Argon2Verifier {
    fn verify(&self, password: &str, hash: Option<&str>) -> bool {
        match hash {
            Some(hash) => Self::verify_phc(password, hash),
            None => {
                let _ = Self::verify_phc(password, &self.dummy_hash);
                false
            }
        }
    }
}

pub struct BasicAuth {
    users: HashMap<String, String>,
    realm: String,
    verifier: Arc<dyn PasswordVerifier>,
}

impl BasicAuth {
    /// Load users from an htpasswd file.
    pub fn from_file(path: impl AsRef<Path>, realm: impl Into<String>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let auth = Self::from_htpasswd(&contents, realm)?;
        info!(
            path = %path.as_ref().display(),
            users = auth.users.len(),
            "Loaded htpasswd file"
        );
        Ok(auth)
    }

    pub fn from_htpasswd(contents: &str, realm: impl Into<String>) -> Result<Self> {
        let mut users = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((user, hash)) = line.split_once(':') {
                users.insert(user.to_string(), hash.to_string());
            }
        }

        Ok(Self {
            users,
            realm: realm.into(),
            verifier: Arc::new(Argon2Verifier::new()?),
        })
    }

    /// Replace the password verifier.
    pub fn with_verifier(mut self, verifier: Arc<dyn PasswordVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }
}

/// Decode `Authorization: Basic <base64(user:password)>`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

impl Provider for BasicAuth {
    fn check(&self, headers: &HeaderMap) -> Result<String> {
        let (user, password) = basic_credentials(headers).ok_or(IdpError::AuthenticationFailure)?;

        let hash = self.users.get(&user).map(String::as_str);
        if self.verifier.verify(&password, hash) {
            Ok(user)
        } else {
            debug!(user = %user, "Basic authentication failed");
            Err(IdpError::AuthenticationFailure)
        }
    }

    fn challenge_header(&self) -> String {
        format!("Basic realm={:?}", self.realm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Plain-text comparison, counting calls.
    #[derive(Default)]
    struct PlainVerifier {
        calls: AtomicUsize,
    }

    impl PasswordVerifier for PlainVerifier {
        fn verify(&self, password: &str, hash: Option<&str>) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            hash == Some(password)
        }
    }

    fn headers_for(user: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    fn plain_auth() -> (BasicAuth, Arc<PlainVerifier>) {
        let verifier = Arc::new(PlainVerifier::default());
        let auth = BasicAuth::from_htpasswd("# users\nalice:secret\n\nbob:hunter2\n", "consent")
            .unwrap()
            .with_verifier(verifier.clone());
        (auth, verifier)
    }

    #[test]
    fn test_valid_credentials() {
        let (auth, _) = plain_auth();
        assert_eq!(auth.check(&headers_for("alice", "secret")).unwrap(), "alice");
        assert_eq!(auth.check(&headers_for("bob", "hunter2")).unwrap(), "bob");
    }

    #[test]
    fn test_wrong_password() {
        let (auth, _) = plain_auth();
        assert!(matches!(
            auth.check(&headers_for("alice", "wrong")),
            Err(IdpError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_unknown_user_still_verifies() {
        let (auth, verifier) = plain_auth();
        assert!(matches!(
            auth.check(&headers_for("mallory", "secret")),
            Err(IdpError::AuthenticationFailure)
        ));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_or_malformed_header() {
        let (auth, verifier) = plain_auth();
        assert!(auth.check(&HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert!(auth.check(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(auth.check(&headers).is_err());

        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_challenge_header() {
        let (auth, _) = plain_auth();
        assert_eq!(auth.challenge_header(), "Basic realm=\"consent\"");
    }

    #[test]
    fn test_argon2_verifier() {
        let salt = SaltString::from_b64("c29tZXNhbHRzb21lc2FsdA").unwrap();
        let hash = Argon2::default()
            .hash_password(b"secret", &salt)
            .unwrap()
            .to_string();

        let verifier = Argon2Verifier::new().unwrap();
        assert!(verifier.verify("secret", Some(&hash)));
        assert!(!verifier.verify("wrong", Some(&hash)));
        assert!(!verifier.verify("secret", None));
        assert!(!verifier.verify("secret", Some("not-a-phc-string")));
    }

    #[test]
    fn test_htpasswd_native_hashes_are_rejected() {
        let auth = BasicAuth::from_htpasswd(
            "alice:$2y$05$c4WoMPo3SXsafkva.HHa6uXQZWr7oboPiC2bT/r7q1BB8I2s0BRqC\n\
             bob:$apr1$r31.....$HqJZimcKQFAMYayBlzkrA/\n\
             carol:{SHA}5en6G6MezRroT3XKqkdPOmY/BfQ=\n",
            "consent",
        )
        .unwrap();

        for user in ["alice", "bob", "carol"] {
            assert!(matches!(
                auth.check(&headers_for(user, "secret")),
                Err(IdpError::AuthenticationFailure)
            ));
        }
    }
}
