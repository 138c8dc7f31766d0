//! Per-flow state for the authorization code flow.
//!
//! A [`FlowSession`] carries the `state`, `nonce` and optional PKCE pair for
//! exactly one authorization attempt. The token exchange takes the session by
//! value, so its secrets cannot be replayed into a second exchange.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::crypto::{constant_time_eq, random_token, EntropySource, SystemEntropy};
use crate::error::OidcError;
use crate::pkce::{PkcePair, DEFAULT_VERIFIER_LEN};

/// Default session lifetime (10 minutes)
pub const DEFAULT_SESSION_TTL_SECS: i64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSession {
    state: String,
    nonce: String,
    pkce: Option<PkcePair>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl FlowSession {
    /// Start a PKCE-protected session using the system CSPRNG.
    pub fn new(ttl: Duration) -> Result<Self, OidcError> {
        Self::generate_with(&mut SystemEntropy, ttl, true, Utc::now())
    }

    /// Start a session without PKCE (confidential clients only).
    pub fn without_pkce(ttl: Duration) -> Result<Self, OidcError> {
        Self::generate_with(&mut SystemEntropy, ttl, false, Utc::now())
    }

    pub fn generate_with<E: EntropySource + ?Sized>(
        source: &mut E,
        ttl: Duration,
        with_pkce: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, OidcError> {
        if ttl <= Duration::zero() {
            return Err(OidcError::Configuration(
                "session lifetime must be positive".to_string(),
            ));
        }

        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            OidcError::Configuration("session lifetime out of range".to_string())
        })?;

        let state = random_token(source)?;
        let nonce = random_token(source)?;
        let pkce = if with_pkce {
            Some(PkcePair::generate_with(source, DEFAULT_VERIFIER_LEN)?)
        } else {
            None
        };

        Ok(Self {
            state,
            nonce,
            pkce,
            created_at: now,
            expires_at,
        })
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn pkce(&self) -> Option<&PkcePair> {
        self.pkce.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Constant-time comparison of a returned `state` with this session's.
    pub fn verify_state(&self, returned: &str) -> bool {
        constant_time_eq(&self.state, returned)
    }

    /// Check a parsed callback against this session: not expired, state matches.
    pub fn check_callback(&self, callback: &AuthorizationCallback) -> Result<(), OidcError> {
        if self.is_expired() {
            return Err(OidcError::SessionExpired);
        }
        match &callback.state {
            Some(state) if self.verify_state(state) => Ok(()),
            _ => Err(OidcError::StateMismatch),
        }
    }

    /// Consume the session, releasing the PKCE verifier for the code exchange.
    pub(crate) fn into_verifier(self) -> Option<String> {
        self.pkce.map(PkcePair::into_verifier)
    }
}

/// Parameters returned on the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCallback {
    pub code: String,
    pub state: Option<String>,
    /// `iss` parameter (RFC 9207), when the provider sends one
    pub issuer: Option<String>,
}

impl AuthorizationCallback {
    /// Parse the query string of the redirect URL.
    ///
    /// An `error` parameter becomes [`OidcError::AuthorizationRejected`]; a
    /// missing `code` is a protocol error.
    pub fn from_redirect_url(redirect: &str) -> Result<Self, OidcError> {
        let url = Url::parse(redirect)
            .map_err(|e| OidcError::Configuration(format!("invalid redirect URL: {}", e)))?;

        let mut code = None;
        let mut state = None;
        let mut issuer = None;
        let mut error = None;
        let mut description = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "iss" => issuer = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Err(OidcError::AuthorizationRejected { error, description });
        }

        let code = code.ok_or_else(|| OidcError::Protocol {
            status: 0,
            body: format!("redirect missing code parameter: {}", url.path()),
        })?;

        Ok(Self {
            code,
            state,
            issuer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_session_values_are_distinct() {
        let session = FlowSession::new(Duration::minutes(10)).unwrap();
        assert_eq!(session.state().len(), 43);
        assert_eq!(session.nonce().len(), 43);
        assert_ne!(session.state(), session.nonce());
        assert!(session.pkce().is_some());

        let other = FlowSession::new(Duration::minutes(10)).unwrap();
        assert_ne!(session.state(), other.state());
        assert_ne!(session.nonce(), other.nonce());
    }

    #[test]
    fn test_without_pkce() {
        let session = FlowSession::without_pkce(Duration::minutes(10)).unwrap();
        assert!(session.pkce().is_none());
        assert!(session.into_verifier().is_none());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let session = FlowSession::generate_with(
            &mut StdRng::seed_from_u64(3),
            Duration::seconds(60),
            true,
            now,
        )
        .unwrap();

        assert!(!session.is_expired_at(now + Duration::seconds(59)));
        assert!(session.is_expired_at(now + Duration::seconds(60)));
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        assert!(matches!(
            FlowSession::new(Duration::zero()),
            Err(OidcError::Configuration(_))
        ));
    }

    #[test]
    fn test_oversized_ttl_rejected() {
        assert!(matches!(
            FlowSession::new(Duration::MAX),
            Err(OidcError::Configuration(_))
        ));
    }

    #[test]
    fn test_verify_state() {
        let session = FlowSession::new(Duration::minutes(10)).unwrap();
        let state = session.state().to_string();
        assert!(session.verify_state(&state));
        assert!(!session.verify_state("forged"));
    }

    #[test]
    fn test_session_roundtrips_through_storage() {
        let session = FlowSession::new(Duration::minutes(10)).unwrap();
        let json = serde_json::to_string(&session).unwrap();
        let restored: FlowSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.state(), session.state());
        assert_eq!(restored.pkce(), session.pkce());
    }

    #[test]
    fn test_parse_callback() {
        let callback = AuthorizationCallback::from_redirect_url(
            "https://app.example/cb?code=abc123&state=xyz&iss=https%3A%2F%2Fidp.example",
        )
        .unwrap();
        assert_eq!(callback.code, "abc123");
        assert_eq!(callback.state.as_deref(), Some("xyz"));
        assert_eq!(callback.issuer.as_deref(), Some("https://idp.example"));
    }

    #[test]
    fn test_parse_callback_error_response() {
        let result = AuthorizationCallback::from_redirect_url(
            "https://app.example/cb?error=access_denied&error_description=User+said+no&state=xyz",
        );
        match result {
            Err(OidcError::AuthorizationRejected { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description.as_deref(), Some("User said no"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_callback_missing_code() {
        let result = AuthorizationCallback::from_redirect_url("https://app.example/cb?state=xyz");
        assert!(matches!(result, Err(OidcError::Protocol { .. })));
    }

    #[test]
    fn test_check_callback() {
        let session = FlowSession::new(Duration::minutes(10)).unwrap();
        let good = AuthorizationCallback {
            code: "c".into(),
            state: Some(session.state().to_string()),
            issuer: None,
        };
        assert!(session.check_callback(&good).is_ok());

        let forged = AuthorizationCallback {
            state: Some("forged".into()),
            ..good.clone()
        };
        assert!(matches!(
            session.check_callback(&forged),
            Err(OidcError::StateMismatch)
        ));

        let missing = AuthorizationCallback {
            state: None,
            ..good
        };
        assert!(matches!(
            session.check_callback(&missing),
            Err(OidcError::StateMismatch)
        ));
    }
}
