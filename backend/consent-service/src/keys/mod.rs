//! Consent key material: roles, JWK decoding, fetching and caching.
//!
//! The authorization server publishes two key sets the consent flow depends on:
//!
//! - `consent.challenge` (public): verifies challenge tokens it redirects to us
//! - `consent.endpoint` (private): signs the consent responses we send back
//!
//! Both are fetched over the authenticated transport, decoded into typed RSA
//! keys and held in [`KeyCache`], which refreshes them in the background when
//! they expire.

pub mod cache;
pub mod fetcher;
pub mod jwk;

pub use cache::KeyCache;
pub use fetcher::{HydraKeyFetcher, KeyFetcher};
pub use jwk::{Jwk, JwkSet};

use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::sync::Arc;

/// Purpose of a cached key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Public key verifying inbound consent challenges.
    Verification,
    /// Private key signing outbound consent responses.
    ConsentSigning,
}

impl KeyRole {
    pub const ALL: [KeyRole; 2] = [KeyRole::Verification, KeyRole::ConsentSigning];

    /// Key set identifier on the key-publishing endpoint.
    pub fn key_set(&self) -> &'static str {
        match self {
            Self::Verification => "consent.challenge",
            Self::ConsentSigning => "consent.endpoint",
        }
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            Self::Verification => KeyKind::Public,
            Self::ConsentSigning => KeyKind::Private,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Verification => 0,
            Self::ConsentSigning => 1,
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verification => f.write_str("verification"),
            Self::ConsentSigning => f.write_str("consent signing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Public,
    Private,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Decoded key as stored in the cache.
#[derive(Clone)]
pub enum KeyMaterial {
    Public(Arc<RsaPublicKey>),
    Private(Arc<RsaPrivateKey>),
}

impl KeyMaterial {
    pub fn kind(&self) -> KeyKind {
        match self {
            Self::Public(_) => KeyKind::Public,
            Self::Private(_) => KeyKind::Private,
        }
    }
}

impl From<RsaPublicKey> for KeyMaterial {
    fn from(key: RsaPublicKey) -> Self {
        Self::Public(Arc::new(key))
    }
}

impl From<RsaPrivateKey> for KeyMaterial {
    fn from(key: RsaPrivateKey) -> Self {
        Self::Private(Arc::new(key))
    }
}

// Never print key components.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial::{:?}", self.kind())
    }
}
