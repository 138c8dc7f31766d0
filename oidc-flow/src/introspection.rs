//! Token introspection (RFC 7662).

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::OidcError;
use crate::token::{network_error, read_body, TokenClient, TokenTypeHint};

/// Introspection result: the `active` flag plus the provider's JSON verbatim.
#[derive(Debug, Clone)]
pub struct IntrospectionResponse {
    pub active: bool,
    pub raw: serde_json::Value,
}

impl IntrospectionResponse {
    /// A top-level member of the response, e.g. `sub`, `scope` or `exp`.
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.raw.get(name)
    }
}

#[derive(Deserialize)]
struct ActiveFlag {
    active: bool,
}

/// Client for a provider's introspection endpoint.
///
/// Authenticates with the credentials of the wrapped [`TokenClient`].
#[derive(Debug, Clone)]
pub struct IntrospectionClient {
    client: TokenClient,
    endpoint: String,
}

impl IntrospectionClient {
    pub fn new(client: TokenClient, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }

    pub async fn introspect(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
    ) -> Result<IntrospectionResponse, OidcError> {
        let mut params = vec![("token", token.to_string())];
        if let Some(hint) = hint {
            params.push(("token_type_hint", hint.as_str().to_string()));
        }

        debug!(endpoint = %self.endpoint, "Introspecting token");

        let response = self
            .client
            .form_request(&self.endpoint, params)?
            .send()
            .await
            .map_err(network_error)?;
        let (status, body) = read_body(response).await?;

        if !(200..300).contains(&status) {
            warn!(endpoint = %self.endpoint, status, "Introspection request rejected");
            return Err(OidcError::Protocol { status, body });
        }

        let raw: serde_json::Value = match serde_json::from_str(&body) {
            Ok(raw) => raw,
            Err(_) => return Err(OidcError::Protocol { status, body }),
        };
        let active = match ActiveFlag::deserialize(&raw) {
            Ok(flag) => flag.active,
            Err(_) => return Err(OidcError::Protocol { status, body }),
        };

        Ok(IntrospectionResponse { active, raw })
    }
}
