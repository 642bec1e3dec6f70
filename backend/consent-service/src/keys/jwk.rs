//! JSON Web Key decoding into typed RSA keys.
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::Deserialize;

use crate::error::{IdpError, Result};

/// Key set document as returned by `GET /keys/{set}/{kind}`.
#[derive(Debug, Deserialize)]
pub struct JwkSet {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

/// Individual JSON Web Key.
///
/// Only RSA keys are supported. Private components are optional so the same
/// type decodes both the public and the private listing of a set.
#[derive(Deserialize)]
pub struct Jwk {
    /// Key type (RSA)
    pub kty: String,
    /// Key ID
    pub kid: Option<String>,
    /// Algorithm
    pub alg: Option<String>,
    /// Key use (sig, enc)
    #[serde(rename = "use")]
    pub key_use: Option<String>,

    // Public parameters
    pub n: Option<String>,
    pub e: Option<String>,

    // Private parameters
    pub d: Option<String>,
    pub p: Option<String>,
    pub q: Option<String>,
}

impl JwkSet {
    /// First key of the set, the one the authorization server considers current.
    pub fn first(&self) -> Option<&Jwk> {
        self.keys.first()
    }
}

impl Jwk {
    pub fn to_public_key(&self) -> Result<RsaPublicKey> {
        self.ensure_rsa()?;
        let n = component(&self.n, "n")?;
        let e = component(&self.e, "e")?;

        Ok(RsaPublicKey::new(n, e)?)
    }

    pub fn to_private_key(&self) -> Result<RsaPrivateKey> {
        self.ensure_rsa()?;
        let n = component(&self.n, "n")?;
        let e = component(&self.e, "e")?;
        let d = component(&self.d, "d")?;
        let p = component(&self.p, "p")?;
        let q = component(&self.q, "q")?;

        let key = RsaPrivateKey::from_components(n, e, d, vec![p, q])?;
        key.validate()?;
        Ok(key)
    }

    fn ensure_rsa(&self) -> Result<()> {
        if self.kty != "RSA" {
            return Err(IdpError::UnsupportedKey(self.kty.clone()));
        }
        Ok(())
    }
}

fn component(value: &Option<String>, name: &str) -> Result<BigUint> {
    let encoded = value
        .as_deref()
        .ok_or_else(|| IdpError::MalformedKey(format!("RSA key missing '{}'", name)))?;
    let bytes = URL_SAFE_NO_PAD.decode(encoded)?;
    Ok(BigUint::from_bytes_be(&bytes))
}

// Private components stay out of logs.
impl std::fmt::Debug for Jwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("use", &self.key_use)
            .field("private", &self.d.is_some())
            .finish()
    }
}
