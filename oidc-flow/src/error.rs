//! Error types for OAuth 2.0 / OpenID Connect client operations

use thiserror::Error;

use crate::oidc::validation::IdTokenValidationError;

/// Errors surfaced by every client operation.
///
/// Only [`OidcError::Network`] is transient. Nothing here is retried
/// automatically; the device poller's `slow_down` backoff is protocol
/// behaviour, not a retry.
#[derive(Debug, Error)]
pub enum OidcError {
    /// Invalid client or flow configuration, detected before any request is sent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The operating system CSPRNG could not be read
    #[error("Secure random number generation failed: {0}")]
    EntropySourceUnavailable(String),

    /// Transport failure (connect, TLS, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx or malformed response from the provider
    #[error("Protocol error (HTTP {status}): {body}")]
    Protocol {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// The token endpoint rejected a grant
    #[error("Token exchange failed (HTTP {status}): {body}")]
    TokenExchangeFailed {
        /// HTTP status code
        status: u16,
        /// OAuth `error` code, when the body carried one
        error: Option<String>,
        /// Raw response body
        body: String,
    },

    /// A client assertion could not be produced
    #[error("Client authentication failed: {0}")]
    ClientAuthenticationFailed(String),

    /// The authorization server redirected back with an error response
    #[error("Authorization rejected: {error}")]
    AuthorizationRejected {
        /// OAuth `error` code
        error: String,
        /// Optional `error_description`
        description: Option<String>,
    },

    /// Callback `state` does not match the issuing session
    #[error("State mismatch")]
    StateMismatch,

    /// The flow session outlived its lifetime
    #[error("Flow session expired")]
    SessionExpired,

    /// ID token rejected
    #[error(transparent)]
    IdTokenValidation(#[from] IdTokenValidationError),
}

impl OidcError {
    /// Whether the caller may reasonably retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, OidcError::Network(_))
    }

    /// The OAuth error code carried by this error, if any.
    pub fn oauth_error(&self) -> Option<&str> {
        match self {
            OidcError::TokenExchangeFailed { error, .. } => error.as_deref(),
            OidcError::AuthorizationRejected { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_transient() {
        assert!(OidcError::Network("timeout".into()).is_transient());
        assert!(!OidcError::Protocol {
            status: 500,
            body: String::new()
        }
        .is_transient());
        assert!(!OidcError::ClientAuthenticationFailed("bad key".into()).is_transient());
    }

    #[test]
    fn test_oauth_error_code() {
        let err = OidcError::TokenExchangeFailed {
            status: 400,
            error: Some("invalid_grant".into()),
            body: r#"{"error":"invalid_grant"}"#.into(),
        };
        assert_eq!(err.oauth_error(), Some("invalid_grant"));
        assert_eq!(OidcError::StateMismatch.oauth_error(), None);
    }
}
