//! Token endpoint client.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

use super::auth::{authenticated_form, ClientAuth};
use super::types::{TokenErrorResponse, TokenSet};
use crate::error::OidcError;
use crate::session::FlowSession;

/// Per-request HTTP timeout
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Client for the token endpoint (RFC 6749 Section 3.2).
///
/// Holds the client credentials for the lifetime of the client; each grant
/// builds its own form and authenticates it independently.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http_client: Client,
    token_endpoint: String,
    device_authorization_endpoint: Option<String>,
    client_id: String,
    auth: ClientAuth,
}

impl TokenClient {
    /// Create a new token client.
    ///
    /// # Arguments
    /// * `token_endpoint` - The provider's token endpoint URL
    /// * `client_id` - The OAuth client ID
    /// * `auth` - How the client authenticates itself
    pub fn new(token_endpoint: &str, client_id: &str, auth: ClientAuth) -> Result<Self, OidcError> {
        if client_id.is_empty() {
            return Err(OidcError::Configuration("client_id must not be empty".to_string()));
        }
        url::Url::parse(token_endpoint).map_err(|e| {
            OidcError::Configuration(format!("invalid token endpoint {}: {}", token_endpoint, e))
        })?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| OidcError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            token_endpoint: token_endpoint.to_string(),
            device_authorization_endpoint: None,
            client_id: client_id.to_string(),
            auth,
        })
    }

    /// Set the device authorization endpoint (RFC 8628 Section 3.1).
    pub fn with_device_authorization_endpoint(mut self, endpoint: &str) -> Self {
        self.device_authorization_endpoint = Some(endpoint.to_string());
        self
    }

    /// Replace the underlying HTTP client (custom TLS roots, proxies).
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn auth_method(&self) -> &'static str {
        self.auth.method_name()
    }

    pub(crate) fn device_authorization_endpoint(&self) -> Option<&str> {
        self.device_authorization_endpoint.as_deref()
    }

    /// Authenticated form POST to `endpoint` with this client's credentials.
    pub(crate) fn form_request(
        &self,
        endpoint: &str,
        params: Vec<(&'static str, String)>,
    ) -> Result<RequestBuilder, OidcError> {
        authenticated_form(&self.http_client, endpoint, &self.client_id, &self.auth, params)
    }

    /// Exchange an authorization code for tokens.
    ///
    /// Consumes the session: its PKCE verifier is sent once and dropped with
    /// it. The caller must already have checked the callback `state`
    /// (see [`FlowSession::check_callback`]).
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        session: FlowSession,
        redirect_uri: &str,
    ) -> Result<TokenSet, OidcError> {
        if session.is_expired() {
            return Err(OidcError::SessionExpired);
        }

        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
        ];
        if let Some(verifier) = session.into_verifier() {
            params.push(("code_verifier", verifier));
        }

        self.request_tokens("authorization_code", params).await
    }

    /// Use a refresh token (RFC 6749 Section 6).
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        scope: Option<&str>,
    ) -> Result<TokenSet, OidcError> {
        let mut params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        if let Some(scope) = scope {
            params.push(("scope", scope.to_string()));
        }

        self.request_tokens("refresh_token", params).await
    }

    /// Client credentials grant (RFC 6749 Section 4.4).
    pub async fn client_credentials(&self, scope: Option<&str>) -> Result<TokenSet, OidcError> {
        if matches!(self.auth, ClientAuth::None) {
            return Err(OidcError::Configuration(
                "client_credentials requires client authentication".to_string(),
            ));
        }

        let mut params = vec![("grant_type", "client_credentials".to_string())];
        if let Some(scope) = scope {
            params.push(("scope", scope.to_string()));
        }

        self.request_tokens("client_credentials", params).await
    }

    async fn request_tokens(
        &self,
        grant: &'static str,
        params: Vec<(&'static str, String)>,
    ) -> Result<TokenSet, OidcError> {
        debug!(
            endpoint = %self.token_endpoint,
            grant,
            auth_method = self.auth.method_name(),
            "Requesting tokens"
        );

        let response = self
            .form_request(&self.token_endpoint, params)?
            .send()
            .await
            .map_err(network_error)?;
        let (status, body) = read_body(response).await?;

        if !(200..300).contains(&status) {
            let error = serde_json::from_str::<TokenErrorResponse>(&body)
                .ok()
                .map(|e| e.error);
            warn!(
                endpoint = %self.token_endpoint,
                grant,
                status,
                error = error.as_deref().unwrap_or("-"),
                "Token request rejected"
            );
            return Err(OidcError::TokenExchangeFailed {
                status,
                error,
                body,
            });
        }

        parse_token_set(status, body)
    }
}

pub(crate) fn network_error(e: reqwest::Error) -> OidcError {
    OidcError::Network(e.to_string())
}

/// Read status and body; a body read failure is a transport error.
pub(crate) async fn read_body(response: Response) -> Result<(u16, String), OidcError> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(network_error)?;
    Ok((status, body))
}

pub(crate) fn parse_token_set(status: u16, body: String) -> Result<TokenSet, OidcError> {
    match serde_json::from_str::<TokenSet>(&body) {
        Ok(tokens) => Ok(tokens),
        Err(e) => {
            warn!(status, error = %e, "Malformed token response");
            Err(OidcError::Protocol { status, body })
        }
    }
}
