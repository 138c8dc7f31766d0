//! Token endpoint request and response types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Successful token endpoint response (RFC 6749 Section 5.1).
///
/// Immutable once produced; ownership passes to the caller.
#[derive(Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenSet {
    access_token: String,

    token_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

impl TokenSet {
    /// The access token.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The token type (usually "Bearer").
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Lifetime of the access token in seconds.
    pub fn expires_in(&self) -> Option<u64> {
        self.expires_in
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// The ID token (OIDC); validate before trusting any claim in it.
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// Scope granted, when it differs from the one requested.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .finish()
    }
}

/// Error response from the token endpoint (RFC 6749 Section 5.2).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    /// The error code.
    pub error: String,

    /// Optional error description.
    #[serde(default)]
    pub error_description: Option<String>,

    #[serde(default)]
    pub error_uri: Option<String>,
}

/// `token_type_hint` for introspection and revocation (RFC 7009 Section 2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenTypeHint::AccessToken => "access_token",
            TokenTypeHint::RefreshToken => "refresh_token",
        }
    }
}

impl std::str::FromStr for TokenTypeHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access_token" => Ok(TokenTypeHint::AccessToken),
            "refresh_token" => Ok(TokenTypeHint::RefreshToken),
            other => Err(format!("unknown token type hint: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_set_deserialize() {
        let json = r#"{
            "access_token": "at-123",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "rt-456",
            "id_token": "a.b.c",
            "scope": "openid profile"
        }"#;

        let tokens: TokenSet = serde_json::from_str(json).unwrap();

        assert_eq!(tokens.access_token(), "at-123");
        assert_eq!(tokens.token_type(), "Bearer");
        assert_eq!(tokens.expires_in(), Some(3600));
        assert_eq!(tokens.refresh_token(), Some("rt-456"));
        assert_eq!(tokens.id_token(), Some("a.b.c"));
        assert_eq!(tokens.scope(), Some("openid profile"));
    }

    #[test]
    fn test_token_set_minimal() {
        let tokens: TokenSet =
            serde_json::from_str(r#"{"access_token":"at","token_type":"Bearer"}"#).unwrap();
        assert!(tokens.expires_in().is_none());
        assert!(tokens.refresh_token().is_none());
        assert!(tokens.id_token().is_none());
    }

    #[test]
    fn test_token_set_requires_access_token() {
        assert!(serde_json::from_str::<TokenSet>(r#"{"token_type":"Bearer"}"#).is_err());
    }

    #[test]
    fn test_token_set_debug_redacts() {
        let tokens: TokenSet = serde_json::from_str(
            r#"{"access_token":"secret-at","token_type":"Bearer","refresh_token":"secret-rt"}"#,
        )
        .unwrap();
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("secret-at"));
        assert!(!debug.contains("secret-rt"));
    }

    #[test]
    fn test_token_type_hint() {
        assert_eq!(TokenTypeHint::RefreshToken.as_str(), "refresh_token");
        assert_eq!(
            "access_token".parse::<TokenTypeHint>().unwrap(),
            TokenTypeHint::AccessToken
        );
        assert!("id_token".parse::<TokenTypeHint>().is_err());
    }
}
