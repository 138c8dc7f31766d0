//! Token revocation (RFC 7009).
//!
//! A failed revocation is returned to the caller as-is and never retried
//! here: the caller must learn that the token may still be live.

use tracing::{info, warn};

use crate::error::OidcError;
use crate::token::{network_error, read_body, TokenClient, TokenTypeHint};

#[derive(Debug, Clone)]
pub struct RevocationClient {
    client: TokenClient,
    endpoint: String,
}

impl RevocationClient {
    pub fn new(client: TokenClient, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }

    /// Revoke `token`. `Ok(())` only on HTTP 200.
    pub async fn revoke(&self, token: &str, hint: Option<TokenTypeHint>) -> Result<(), OidcError> {
        let mut params = vec![("token", token.to_string())];
        if let Some(hint) = hint {
            params.push(("token_type_hint", hint.as_str().to_string()));
        }

        let response = self
            .client
            .form_request(&self.endpoint, params)?
            .send()
            .await
            .map_err(network_error)?;
        let (status, body) = read_body(response).await?;

        if status != 200 {
            warn!(endpoint = %self.endpoint, status, "Token revocation failed");
            return Err(OidcError::Protocol { status, body });
        }

        info!(endpoint = %self.endpoint, "Token revoked");
        Ok(())
    }
}
