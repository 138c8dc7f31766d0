//! PKCE (RFC 7636) verifier/challenge generation.
//!
//! Only the `S256` transform is supported. The `plain` method offers no
//! protection against an attacker who can read the authorization request,
//! so it is not implemented.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::{
    base64url_encode, constant_time_eq, random_bytes_from, sha256, EntropySource, SystemEntropy,
};
use crate::error::OidcError;

/// Shortest verifier allowed by RFC 7636 Section 4.1
pub const MIN_VERIFIER_LEN: usize = 43;

/// Longest verifier allowed by RFC 7636 Section 4.1
pub const MAX_VERIFIER_LEN: usize = 128;

pub const DEFAULT_VERIFIER_LEN: usize = 64;

/// The only supported `code_challenge_method`
pub const CHALLENGE_METHOD: &str = "S256";

/// Unreserved characters per RFC 3986 Section 2.3
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Largest multiple of the charset size that fits in a byte; bytes at or
/// above it are rejected to keep the distribution uniform.
const REJECTION_BOUND: u8 = (256 / VERIFIER_CHARSET.len() * VERIFIER_CHARSET.len()) as u8;

/// A PKCE verifier and its S256 challenge.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkcePair {
    verifier: String,
    challenge: String,
}

impl PkcePair {
    /// Generate a pair with a 64-character verifier from the system CSPRNG.
    pub fn generate() -> Result<Self, OidcError> {
        Self::generate_with(&mut SystemEntropy, DEFAULT_VERIFIER_LEN)
    }

    /// Generate a pair with a verifier of `len` characters drawn from `source`.
    ///
    /// Deterministic for a deterministic source.
    pub fn generate_with<E: EntropySource + ?Sized>(
        source: &mut E,
        len: usize,
    ) -> Result<Self, OidcError> {
        check_length(len)?;

        let mut verifier = String::with_capacity(len);
        while verifier.len() < len {
            for byte in random_bytes_from(source, len)? {
                if byte >= REJECTION_BOUND {
                    continue;
                }
                verifier.push(VERIFIER_CHARSET[byte as usize % VERIFIER_CHARSET.len()] as char);
                if verifier.len() == len {
                    break;
                }
            }
        }

        Ok(Self::from_verifier_unchecked(verifier))
    }

    /// Build a pair from an existing verifier, validating length and charset.
    pub fn from_verifier(verifier: &str) -> Result<Self, OidcError> {
        check_length(verifier.len())?;
        if !verifier.bytes().all(|b| VERIFIER_CHARSET.contains(&b)) {
            return Err(OidcError::Configuration(
                "PKCE verifier contains characters outside [A-Za-z0-9._~-]".to_string(),
            ));
        }
        Ok(Self::from_verifier_unchecked(verifier.to_string()))
    }

    fn from_verifier_unchecked(verifier: String) -> Self {
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn method(&self) -> &'static str {
        CHALLENGE_METHOD
    }

    /// Consume the pair, yielding the verifier for the token request.
    pub fn into_verifier(self) -> String {
        self.verifier
    }

    /// Check a verifier against a previously issued challenge.
    pub fn verify(verifier: &str, challenge: &str) -> bool {
        constant_time_eq(&challenge_for(verifier), challenge)
    }
}

impl fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .field("method", &CHALLENGE_METHOD)
            .finish()
    }
}

/// `BASE64URL(SHA256(ASCII(verifier)))`
pub fn challenge_for(verifier: &str) -> String {
    base64url_encode(sha256(verifier.as_bytes()))
}

fn check_length(len: usize) -> Result<(), OidcError> {
    if !(MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&len) {
        return Err(OidcError::Configuration(format!(
            "PKCE verifier length must be between {} and {}, got {}",
            MIN_VERIFIER_LEN, MAX_VERIFIER_LEN, len
        )));
    }
    Ok(())
}
