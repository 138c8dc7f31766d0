//! ID token parsing and claims extraction.

use serde::{Deserialize, Serialize};

use crate::crypto::base64url_decode;
use crate::oidc::validation::{IdTokenValidationError, ValidationReason};

/// JOSE header of an ID token.
///
/// `alg` is kept as a string so that `none` and unknown algorithms parse
/// and are rejected by signature verification rather than as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenHeader {
    pub alg: String,

    #[serde(default)]
    pub typ: Option<String>,

    /// Key ID used to select the verification key
    #[serde(default)]
    pub kid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer
    pub iss: String,

    /// Subject (user identifier)
    pub sub: String,

    /// Audience
    pub aud: StringOrVec,

    /// Expiration time
    pub exp: i64,

    /// Issued at
    pub iat: i64,

    #[serde(default)]
    pub nonce: Option<String>,

    /// Authentication time
    #[serde(default)]
    pub auth_time: Option<i64>,

    /// Authorized party
    #[serde(default)]
    pub azp: Option<String>,

    /// Authentication Context Class Reference
    #[serde(default)]
    pub acr: Option<String>,

    /// Authentication Methods References
    #[serde(default)]
    pub amr: Option<Vec<String>>,

    /// Every other claim, as sent
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

/// Handle audience as string or array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrVec {
    String(String),
    Vec(Vec<String>),
}

impl StringOrVec {
    /// Check if the audience contains a specific value
    pub fn contains(&self, value: &str) -> bool {
        match self {
            StringOrVec::String(s) => s == value,
            StringOrVec::Vec(v) => v.iter().any(|s| s == value),
        }
    }

    /// Number of audience values
    pub fn len(&self) -> usize {
        match self {
            StringOrVec::String(_) => 1,
            StringOrVec::Vec(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A structurally valid ID token whose signature has not been checked yet.
#[derive(Debug, Clone)]
pub struct DecodedIdToken {
    pub header: IdTokenHeader,
    pub payload: IdTokenClaims,
}

/// Split and parse a compact JWS without verifying it.
///
/// Fails with reason `structural` unless there are exactly three non-empty
/// base64url segments whose header and payload parse as JSON with the
/// required claims.
pub fn decode_unverified(token: &str) -> Result<DecodedIdToken, IdTokenValidationError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(structural(format!(
            "expected 3 segments, found {}",
            parts.len()
        )));
    }
    if parts.iter().any(|part| part.is_empty()) {
        return Err(structural("empty segment"));
    }

    let header = decode_segment(parts[0], "header")?;
    let payload = decode_segment(parts[1], "payload")?;
    base64url_decode(parts[2]).map_err(|e| structural(format!("signature: {}", e)))?;

    Ok(DecodedIdToken { header, payload })
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    name: &str,
) -> Result<T, IdTokenValidationError> {
    let bytes = base64url_decode(segment).map_err(|e| structural(format!("{}: {}", name, e)))?;
    serde_json::from_slice(&bytes).map_err(|e| structural(format!("{}: {}", name, e)))
}

fn structural(detail: impl Into<String>) -> IdTokenValidationError {
    IdTokenValidationError::new(ValidationReason::Structural, detail)
}
