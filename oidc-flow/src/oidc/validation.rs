//! ID token validation (OpenID Connect Core 1.0, Section 3.1.3.7).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use jsonwebtoken::{decode, Algorithm, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::crypto::constant_time_eq;
use crate::oidc::keys::KeyResolver;
use crate::oidc::token::{decode_unverified, DecodedIdToken};

/// Which check rejected the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    Structural,
    Signature,
    Issuer,
    Audience,
    Expired,
    IssuedInFuture,
    NonceMismatch,
    AuthTimeStale,
    AzpMissing,
}

impl ValidationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationReason::Structural => "structural",
            ValidationReason::Signature => "signature",
            ValidationReason::Issuer => "issuer",
            ValidationReason::Audience => "audience",
            ValidationReason::Expired => "expired",
            ValidationReason::IssuedInFuture => "issued_in_future",
            ValidationReason::NonceMismatch => "nonce_mismatch",
            ValidationReason::AuthTimeStale => "auth_time_stale",
            ValidationReason::AzpMissing => "azp_missing",
        }
    }
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("ID token rejected ({reason}): {detail}")]
pub struct IdTokenValidationError {
    pub reason: ValidationReason,
    pub detail: String,
}

impl IdTokenValidationError {
    pub fn new(reason: ValidationReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Values the token must match, taken from the client configuration and the
/// flow session that requested it.
#[derive(Debug, Clone)]
pub struct ExpectedClaims {
    pub issuer: String,
    /// The client_id
    pub audience: String,
    /// Nonce sent in the authorization request, if any
    pub nonce: Option<String>,
    /// `max_age` sent in the authorization request, in seconds
    pub max_age: Option<u64>,
}

impl ExpectedClaims {
    pub fn new(issuer: &str, audience: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            nonce: None,
            max_age: None,
        }
    }

    pub fn with_nonce(mut self, nonce: &str) -> Self {
        self.nonce = Some(nonce.to_string());
        self
    }

    pub fn with_max_age(mut self, max_age: u64) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Tolerance applied to exp, iat and auth_time, in seconds
    pub clock_skew_secs: i64,
    /// Signature algorithms accepted; anything else fails as `signature`
    pub allowed_algorithms: Vec<Algorithm>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            clock_skew_secs: 0,
            allowed_algorithms: vec![
                Algorithm::RS256,
                Algorithm::RS384,
                Algorithm::RS512,
                Algorithm::PS256,
                Algorithm::PS384,
                Algorithm::PS512,
                Algorithm::ES256,
                Algorithm::ES384,
                Algorithm::EdDSA,
                Algorithm::HS256,
                Algorithm::HS384,
                Algorithm::HS512,
            ],
        }
    }
}

/// Validates ID tokens against a key resolver supplied by the caller.
pub struct IdTokenValidator {
    resolver: Arc<dyn KeyResolver>,
    config: ValidationConfig,
}

impl IdTokenValidator {
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self::with_config(resolver, ValidationConfig::default())
    }

    pub fn with_config(resolver: Arc<dyn KeyResolver>, config: ValidationConfig) -> Self {
        Self { resolver, config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate `id_token` against the local wall clock.
    pub async fn validate(
        &self,
        id_token: &str,
        expected: &ExpectedClaims,
    ) -> Result<DecodedIdToken, IdTokenValidationError> {
        self.validate_at(id_token, expected, chrono::Utc::now().timestamp())
            .await
    }

    /// Validate `id_token` as of `now` (seconds since the Unix epoch).
    ///
    /// Runs every check in order and stops at the first failure.
    pub async fn validate_at(
        &self,
        id_token: &str,
        expected: &ExpectedClaims,
        now: i64,
    ) -> Result<DecodedIdToken, IdTokenValidationError> {
        let decoded = decode_unverified(id_token)?;

        self.verify_signature(id_token, &decoded, &expected.issuer)
            .await?;

        let claims = &decoded.payload;
        let skew = self.config.clock_skew_secs;

        if claims.iss != expected.issuer {
            return Err(IdTokenValidationError::new(
                ValidationReason::Issuer,
                format!("expected {}, got {}", expected.issuer, claims.iss),
            ));
        }

        if !claims.aud.contains(&expected.audience) {
            return Err(IdTokenValidationError::new(
                ValidationReason::Audience,
                format!("{} is not an audience of this token", expected.audience),
            ));
        }

        if claims.exp.saturating_add(skew) <= now {
            return Err(IdTokenValidationError::new(
                ValidationReason::Expired,
                format!("expired at {}", claims.exp),
            ));
        }

        if claims.iat > now.saturating_add(skew) {
            return Err(IdTokenValidationError::new(
                ValidationReason::IssuedInFuture,
                format!("issued at {}", claims.iat),
            ));
        }

        if let Some(nonce) = &expected.nonce {
            match &claims.nonce {
                Some(actual) if constant_time_eq(actual, nonce) => {}
                Some(_) => {
                    return Err(IdTokenValidationError::new(
                        ValidationReason::NonceMismatch,
                        "nonce does not match",
                    ))
                }
                None => {
                    return Err(IdTokenValidationError::new(
                        ValidationReason::NonceMismatch,
                        "nonce missing",
                    ))
                }
            }
        }

        if let Some(max_age) = expected.max_age {
            let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
            match claims.auth_time {
                Some(auth_time) => {
                    let age = now.saturating_sub(auth_time);
                    if age > max_age.saturating_add(skew) {
                        return Err(IdTokenValidationError::new(
                            ValidationReason::AuthTimeStale,
                            format!("authenticated {}s ago, max_age is {}s", age, max_age),
                        ));
                    }
                }
                None => {
                    // auth_time is mandatory when max_age was requested
                    return Err(IdTokenValidationError::new(
                        ValidationReason::AuthTimeStale,
                        "auth_time missing",
                    ));
                }
            }
        }

        if claims.aud.len() > 1 && claims.azp.as_deref() != Some(expected.audience.as_str()) {
            return Err(IdTokenValidationError::new(
                ValidationReason::AzpMissing,
                match &claims.azp {
                    Some(azp) => format!("azp {} does not match {}", azp, expected.audience),
                    None => "azp missing for multi-audience token".to_string(),
                },
            ));
        }

        debug!(sub = %claims.sub, "ID token validated");
        Ok(decoded)
    }

    async fn verify_signature(
        &self,
        id_token: &str,
        decoded: &DecodedIdToken,
        issuer: &str,
    ) -> Result<(), IdTokenValidationError> {
        let algorithm = Algorithm::from_str(&decoded.header.alg)
            .ok()
            .filter(|alg| self.config.allowed_algorithms.contains(alg))
            .ok_or_else(|| {
                IdTokenValidationError::new(
                    ValidationReason::Signature,
                    format!("algorithm {} not allowed", decoded.header.alg),
                )
            })?;

        // Keys are looked up under the expected issuer, never the token's claim
        let key = self
            .resolver
            .resolve_public_key(issuer, decoded.header.kid.as_deref())
            .await
            .map_err(|e| IdTokenValidationError::new(ValidationReason::Signature, e.to_string()))?;

        // Signature only; claims are checked above with the configured skew
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<serde_json::Value>(id_token, &key, &validation)
            .map_err(|e| IdTokenValidationError::new(ValidationReason::Signature, e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oidc::keys::StaticKeyResolver;
    use jsonwebtoken::{encode, DecodingKey, EncodingKey, Header};
    use serde_json::json;

    const ISSUER: &str = "https://idp.example";
    const CLIENT_ID: &str = "client123";
    const SECRET: &[u8] = b"test-hmac-secret";
    const NOW: i64 = 1_800_000_000;

    const RSA_2048_PRIVATE: &str = include_str!("../../tests/fixtures/rsa2048-private.pem");
    const JWKS: &str = include_str!("../../tests/fixtures/jwks.json");

    fn hs256_validator() -> IdTokenValidator {
        let resolver =
            StaticKeyResolver::new().with_key(ISSUER, None, DecodingKey::from_secret(SECRET));
        IdTokenValidator::new(Arc::new(resolver))
    }

    fn claims() -> serde_json::Value {
        json!({
            "iss": ISSUER,
            "sub": "u1",
            "aud": CLIENT_ID,
            "exp": NOW + 3600,
            "iat": NOW,
            "nonce": "abc"
        })
    }

    fn with(mut claims: serde_json::Value, key: &str, value: serde_json::Value) -> serde_json::Value {
        claims[key] = value;
        claims
    }

    fn hs256(claims: &serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    fn expected() -> ExpectedClaims {
        ExpectedClaims::new(ISSUER, CLIENT_ID).with_nonce("abc")
    }

    async fn reason(token: &str, expected: &ExpectedClaims) -> ValidationReason {
        hs256_validator()
            .validate_at(token, expected, NOW)
            .await
            .unwrap_err()
            .reason
    }

    #[tokio::test]
    async fn test_end_to_end_valid_token() {
        let decoded = hs256_validator()
            .validate_at(&hs256(&claims()), &expected(), NOW)
            .await
            .unwrap();
        assert_eq!(decoded.payload.sub, "u1");
        assert_eq!(decoded.header.alg, "HS256");
    }

    #[tokio::test]
    async fn test_rs256_with_jwks_resolver() {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("test-key-1".to_string());
        let token = encode(
            &header,
            &claims(),
            &EncodingKey::from_rsa_pem(RSA_2048_PRIVATE.as_bytes()).unwrap(),
        )
        .unwrap();

        let resolver = StaticKeyResolver::from_jwk_set_json(ISSUER, JWKS).unwrap();
        let validator = IdTokenValidator::new(Arc::new(resolver));

        let decoded = validator.validate_at(&token, &expected(), NOW).await.unwrap();
        assert_eq!(decoded.payload.sub, "u1");
    }

    #[tokio::test]
    async fn test_rs256_unknown_kid_fails_signature() {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("rotated-away".to_string());
        let token = encode(
            &header,
            &claims(),
            &EncodingKey::from_rsa_pem(RSA_2048_PRIVATE.as_bytes()).unwrap(),
        )
        .unwrap();

        let resolver = StaticKeyResolver::from_jwk_set_json(ISSUER, JWKS).unwrap();
        let err = IdTokenValidator::new(Arc::new(resolver))
            .validate_at(&token, &expected(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.reason, ValidationReason::Signature);
    }

    #[tokio::test]
    async fn test_algorithm_confusion_rejected() {
        // HS256 token checked against an RSA key must not verify
        let resolver = StaticKeyResolver::from_jwk_set_json(ISSUER, JWKS).unwrap();
        let err = IdTokenValidator::new(Arc::new(resolver))
            .validate_at(&hs256(&claims()), &expected(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.reason, ValidationReason::Signature);
    }

    #[tokio::test]
    async fn test_structural() {
        assert_eq!(
            reason("a.b", &expected()).await,
            ValidationReason::Structural
        );
    }

    #[tokio::test]
    async fn test_tampered_signature() {
        let token = hs256(&claims());
        let tampered = format!("{}AAAA", token.trim_end_matches(|c| c != '.'));
        assert_eq!(
            reason(&tampered, &expected()).await,
            ValidationReason::Signature
        );

        let other_key = encode(
            &Header::new(Algorithm::HS256),
            &claims(),
            &EncodingKey::from_secret(b"another-secret"),
        )
        .unwrap();
        assert_eq!(
            reason(&other_key, &expected()).await,
            ValidationReason::Signature
        );
    }

    #[tokio::test]
    async fn test_alg_none_rejected() {
        use crate::crypto::base64url_encode;
        let token = format!(
            "{}.{}.AAAA",
            base64url_encode(r#"{"alg":"none"}"#),
            base64url_encode(claims().to_string())
        );
        assert_eq!(
            reason(&token, &expected()).await,
            ValidationReason::Signature
        );
    }

    #[tokio::test]
    async fn test_disallowed_algorithm() {
        let config = ValidationConfig {
            allowed_algorithms: vec![Algorithm::RS256],
            ..ValidationConfig::default()
        };
        let resolver =
            StaticKeyResolver::new().with_key(ISSUER, None, DecodingKey::from_secret(SECRET));
        let err = IdTokenValidator::with_config(Arc::new(resolver), config)
            .validate_at(&hs256(&claims()), &expected(), NOW)
            .await
            .unwrap_err();
        assert_eq!(err.reason, ValidationReason::Signature);
    }

    #[tokio::test]
    async fn test_issuer_mismatch() {
        let token = hs256(&with(claims(), "iss", json!("https://evil.example")));
        assert_eq!(reason(&token, &expected()).await, ValidationReason::Issuer);
    }

    #[tokio::test]
    async fn test_audience_mismatch() {
        let token = hs256(&with(claims(), "aud", json!("other-client")));
        assert_eq!(
            reason(&token, &expected()).await,
            ValidationReason::Audience
        );
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let past = hs256(&with(claims(), "exp", json!(NOW - 1)));
        assert_eq!(reason(&past, &expected()).await, ValidationReason::Expired);

        let future = hs256(&with(claims(), "exp", json!(NOW + 1)));
        assert!(hs256_validator()
            .validate_at(&future, &expected(), NOW)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_clock_skew_tolerance() {
        let config = ValidationConfig {
            clock_skew_secs: 30,
            ..ValidationConfig::default()
        };
        let resolver =
            StaticKeyResolver::new().with_key(ISSUER, None, DecodingKey::from_secret(SECRET));
        let validator = IdTokenValidator::with_config(Arc::new(resolver), config);

        let recently_expired = hs256(&with(claims(), "exp", json!(NOW - 10)));
        assert!(validator
            .validate_at(&recently_expired, &expected(), NOW)
            .await
            .is_ok());

        let slightly_future = hs256(&with(claims(), "iat", json!(NOW + 10)));
        assert!(validator
            .validate_at(&slightly_future, &expected(), NOW)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_issued_in_future() {
        let token = hs256(&with(claims(), "iat", json!(NOW + 60)));
        assert_eq!(
            reason(&token, &expected()).await,
            ValidationReason::IssuedInFuture
        );
    }

    #[tokio::test]
    async fn test_nonce_mismatch() {
        let token = hs256(&with(claims(), "nonce", json!("xyz")));
        assert_eq!(
            reason(&token, &expected()).await,
            ValidationReason::NonceMismatch
        );

        let mut missing = claims();
        missing.as_object_mut().unwrap().remove("nonce");
        assert_eq!(
            reason(&hs256(&missing), &expected()).await,
            ValidationReason::NonceMismatch
        );

        // No nonce expected: the claim is not checked
        let no_nonce = ExpectedClaims::new(ISSUER, CLIENT_ID);
        assert!(hs256_validator()
            .validate_at(&hs256(&missing), &no_nonce, NOW)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_max_age() {
        let expected = expected().with_max_age(300);

        let missing = hs256(&claims());
        assert_eq!(
            reason(&missing, &expected).await,
            ValidationReason::AuthTimeStale
        );

        let stale = hs256(&with(claims(), "auth_time", json!(NOW - 301)));
        assert_eq!(
            reason(&stale, &expected).await,
            ValidationReason::AuthTimeStale
        );

        let fresh = hs256(&with(claims(), "auth_time", json!(NOW - 300)));
        assert!(hs256_validator()
            .validate_at(&fresh, &expected, NOW)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_multiple_audiences_require_azp() {
        let multi = with(claims(), "aud", json!([CLIENT_ID, "api"]));
        assert_eq!(
            reason(&hs256(&multi), &expected()).await,
            ValidationReason::AzpMissing
        );

        let wrong_azp = with(multi.clone(), "azp", json!("api"));
        assert_eq!(
            reason(&hs256(&wrong_azp), &expected()).await,
            ValidationReason::AzpMissing
        );

        let good = with(multi, "azp", json!(CLIENT_ID));
        assert!(hs256_validator()
            .validate_at(&hs256(&good), &expected(), NOW)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_checks_run_in_order() {
        // Wrong issuer and expired: issuer is checked first
        let token = hs256(&with(
            with(claims(), "iss", json!("https://evil.example")),
            "exp",
            json!(NOW - 100),
        ));
        assert_eq!(reason(&token, &expected()).await, ValidationReason::Issuer);

        // Expired and wrong nonce: expiry comes first
        let token = hs256(&with(
            with(claims(), "nonce", json!("xyz")),
            "exp",
            json!(NOW - 100),
        ));
        assert_eq!(reason(&token, &expected()).await, ValidationReason::Expired);
    }

    #[test]
    fn test_reason_names() {
        assert_eq!(ValidationReason::IssuedInFuture.as_str(), "issued_in_future");
        assert_eq!(
            serde_json::to_string(&ValidationReason::AzpMissing).unwrap(),
            "\"azp_missing\""
        );
    }
}
