//! Cryptographic primitives
//!
//! This module provides:
//! - CSPRNG access behind an injectable [`EntropySource`]
//! - SHA-256
//! - base64url (RFC 4648 §5) encoding and decoding
//! - Signed JWT client assertions (RFC 7523)

pub mod assertion;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::OidcError;

pub use assertion::{sign_client_assertion, AssertionClaims, AssertionKey, CLIENT_ASSERTION_TYPE};

/// Number of random bytes behind state, nonce and jti values (256 bits).
pub const TOKEN_ENTROPY_BYTES: usize = 32;

/// Source of cryptographically secure random bytes.
///
/// Production code uses [`SystemEntropy`]. Any `rand` CSPRNG also qualifies,
/// which lets tests run against a seeded generator.
pub trait EntropySource {
    /// Fill `dest` entirely with random bytes.
    fn fill(&mut self, dest: &mut [u8]) -> Result<(), OidcError>;
}

/// Operating system CSPRNG via getrandom
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEntropy;

impl EntropySource for SystemEntropy {
    fn fill(&mut self, dest: &mut [u8]) -> Result<(), OidcError> {
        getrandom::getrandom(dest).map_err(|e| OidcError::EntropySourceUnavailable(e.to_string()))
    }
}

impl<R: RngCore + CryptoRng> EntropySource for R {
    fn fill(&mut self, dest: &mut [u8]) -> Result<(), OidcError> {
        self.try_fill_bytes(dest)
            .map_err(|e| OidcError::EntropySourceUnavailable(e.to_string()))
    }
}

/// Read `n` bytes from the operating system CSPRNG.
pub fn random_bytes(n: usize) -> Result<Vec<u8>, OidcError> {
    random_bytes_from(&mut SystemEntropy, n)
}

/// Read `n` bytes from the given entropy source.
pub fn random_bytes_from<E: EntropySource + ?Sized>(
    source: &mut E,
    n: usize,
) -> Result<Vec<u8>, OidcError> {
    let mut bytes = vec![0u8; n];
    source.fill(&mut bytes)?;
    Ok(bytes)
}

/// Generate an opaque, URL-safe token with 256 bits of entropy (43 chars).
pub fn random_token<E: EntropySource + ?Sized>(source: &mut E) -> Result<String, OidcError> {
    let bytes = random_bytes_from(source, TOKEN_ENTROPY_BYTES)?;
    Ok(base64url_encode(bytes))
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Unpadded base64url encoding.
pub fn base64url_encode(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// base64url decoding that accepts both padded and unpadded input.
pub fn base64url_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = input.trim_end_matches('=');
    URL_SAFE_NO_PAD.decode(trimmed)
}

/// Constant-time string comparison for secrets echoed back by the provider.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
