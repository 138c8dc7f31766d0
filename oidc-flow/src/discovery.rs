//! OpenID Provider metadata discovery.
//!
//! Only the endpoint locations are used. `jwks_uri` is exposed for the
//! caller's own key resolver; its contents are never fetched here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::OidcError;
use crate::token::{network_error, read_body, HTTP_TIMEOUT_SECS};

/// OIDC Discovery document (partial)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,

    pub authorization_endpoint: String,

    pub token_endpoint: String,

    #[serde(default)]
    pub device_authorization_endpoint: Option<String>,

    #[serde(default)]
    pub revocation_endpoint: Option<String>,

    #[serde(default)]
    pub introspection_endpoint: Option<String>,

    #[serde(default)]
    pub jwks_uri: Option<String>,

    #[serde(default)]
    pub userinfo_endpoint: Option<String>,

    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,

    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

impl ProviderMetadata {
    /// Fetch `{issuer}/.well-known/openid-configuration`.
    ///
    /// The document's `issuer` must equal the configured one; a trailing
    /// slash on either side is ignored.
    pub async fn discover(issuer: &str) -> Result<Self, OidcError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| OidcError::Configuration(format!("failed to create HTTP client: {}", e)))?;
        Self::discover_with(&client, issuer).await
    }

    pub async fn discover_with(client: &reqwest::Client, issuer: &str) -> Result<Self, OidcError> {
        let issuer = issuer.trim_end_matches('/');
        let discovery_url = format!("{}/.well-known/openid-configuration", issuer);
        debug!(url = %discovery_url, "Fetching provider metadata");

        let response = client
            .get(&discovery_url)
            .send()
            .await
            .map_err(network_error)?;
        let (status, body) = read_body(response).await?;

        if !(200..300).contains(&status) {
            warn!(url = %discovery_url, status, "Discovery request failed");
            return Err(OidcError::Protocol { status, body });
        }

        let metadata: ProviderMetadata = match serde_json::from_str(&body) {
            Ok(metadata) => metadata,
            Err(_) => return Err(OidcError::Protocol { status, body }),
        };

        // Verify issuer matches
        if metadata.issuer.trim_end_matches('/') != issuer {
            return Err(OidcError::Configuration(format!(
                "Discovery issuer '{}' doesn't match configured issuer '{}'",
                metadata.issuer, issuer
            )));
        }

        Ok(metadata)
    }

    /// Whether the provider advertises S256 PKCE. Absence of the field
    /// is not proof of lack of support.
    pub fn advertises_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .iter()
            .any(|m| m == "S256")
    }
}
