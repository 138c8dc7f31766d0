//! Verification key lookup for ID tokens.
//!
//! Fetching and caching a provider's JWKS is left to the application: it
//! plugs its own [`KeyResolver`] into the validator. [`StaticKeyResolver`]
//! covers keys known ahead of time, including a JWK Set read from disk.

use async_trait::async_trait;
use jsonwebtoken::jwk::{JwkSet, PublicKeyUse};
use jsonwebtoken::DecodingKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyResolutionError {
    #[error("Key not found for issuer {issuer} (kid: {kid:?})")]
    KeyNotFound { issuer: String, kid: Option<String> },

    #[error("Failed to parse JWKS: {0}")]
    JwksParseError(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Failure inside a caller-supplied resolver (fetch, cache)
    #[error("Key resolution failed: {0}")]
    Unavailable(String),
}

/// Resolves the key that verifies an ID token's signature.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// `issuer` is the expected issuer, `kid` the token header's key ID.
    async fn resolve_public_key(
        &self,
        issuer: &str,
        kid: Option<&str>,
    ) -> Result<DecodingKey, KeyResolutionError>;
}

struct RegisteredKey {
    issuer: String,
    kid: Option<String>,
    key: DecodingKey,
}

/// Fixed set of keys, looked up by issuer and kid.
#[derive(Default)]
pub struct StaticKeyResolver {
    keys: Vec<RegisteredKey>,
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` for `issuer` under an optional key ID.
    pub fn with_key(mut self, issuer: &str, kid: Option<&str>, key: DecodingKey) -> Self {
        self.keys.push(RegisteredKey {
            issuer: issuer.trim_end_matches('/').to_string(),
            kid: kid.map(String::from),
            key,
        });
        self
    }

    /// Register every signing key of a JWK Set for `issuer`.
    ///
    /// Keys marked `"use": "enc"` are skipped.
    pub fn from_jwk_set(issuer: &str, jwks: &JwkSet) -> Result<Self, KeyResolutionError> {
        let mut resolver = Self::new();
        for jwk in &jwks.keys {
            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                continue;
            }
            let key = DecodingKey::from_jwk(jwk)
                .map_err(|e| KeyResolutionError::InvalidKey(e.to_string()))?;
            resolver = resolver.with_key(issuer, jwk.common.key_id.as_deref(), key);
        }
        Ok(resolver)
    }

    /// Parse a JWK Set document and register its keys for `issuer`.
    pub fn from_jwk_set_json(issuer: &str, json: &str) -> Result<Self, KeyResolutionError> {
        let jwks: JwkSet = serde_json::from_str(json)
            .map_err(|e| KeyResolutionError::JwksParseError(e.to_string()))?;
        Self::from_jwk_set(issuer, &jwks)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn lookup(&self, issuer: &str, kid: Option<&str>) -> Option<&DecodingKey> {
        let issuer = issuer.trim_end_matches('/');
        let mut candidates = self.keys.iter().filter(|k| k.issuer == issuer);

        match kid {
            // A token naming a kid must match it exactly
            Some(kid) => candidates
                .find(|k| k.kid.as_deref() == Some(kid))
                .map(|k| &k.key),
            None => candidates.next().map(|k| &k.key),
        }
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve_public_key(
        &self,
        issuer: &str,
        kid: Option<&str>,
    ) -> Result<DecodingKey, KeyResolutionError> {
        self.lookup(issuer, kid)
            .cloned()
            .ok_or_else(|| KeyResolutionError::KeyNotFound {
                issuer: issuer.to_string(),
                kid: kid.map(String::from),
            })
    }
}
