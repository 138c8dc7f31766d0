//! Device flow requests over HTTP.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::poller::DeviceGrant;
use super::types::{DeviceAuthorizationResponse, DevicePollResponse};
use crate::error::OidcError;
use crate::token::{network_error, parse_token_set, read_body, TokenClient, TokenErrorResponse};

/// `grant_type` for polling the token endpoint (RFC 8628 Section 3.4)
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

#[async_trait]
impl DeviceGrant for TokenClient {
    async fn request_device_authorization(
        &self,
        scope: &str,
    ) -> Result<DeviceAuthorizationResponse, OidcError> {
        let endpoint = self.device_authorization_endpoint().ok_or_else(|| {
            OidcError::Configuration("no device authorization endpoint configured".to_string())
        })?;

        debug!(endpoint, scope, "Requesting device authorization");

        let response = self
            .form_request(endpoint, vec![("scope", scope.to_string())])?
            .send()
            .await
            .map_err(network_error)?;
        let (status, body) = read_body(response).await?;

        if !(200..300).contains(&status) {
            warn!(endpoint, status, "Device authorization request rejected");
            return Err(OidcError::Protocol { status, body });
        }

        match serde_json::from_str(&body) {
            Ok(response) => Ok(response),
            Err(_) => Err(OidcError::Protocol { status, body }),
        }
    }

    async fn poll_device_token(&self, device_code: &str) -> Result<DevicePollResponse, OidcError> {
        let params = vec![
            ("grant_type", DEVICE_CODE_GRANT_TYPE.to_string()),
            ("device_code", device_code.to_string()),
        ];

        let response = self
            .form_request(self.token_endpoint(), params)?
            .send()
            .await
            .map_err(network_error)?;
        let (status, body) = read_body(response).await?;

        if (200..300).contains(&status) {
            return parse_token_set(status, body).map(DevicePollResponse::Token);
        }

        match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(error) => Ok(error.into_poll_response(status, body)),
            Err(_) => Err(OidcError::Protocol { status, body }),
        }
    }
}
