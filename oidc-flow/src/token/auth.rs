//! Client authentication for requests to the provider's back-channel endpoints.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use url::form_urlencoded;

use crate::crypto::{sign_client_assertion, AssertionKey, CLIENT_ASSERTION_TYPE};
use crate::error::OidcError;

/// How the client proves its identity to the token, device authorization,
/// introspection and revocation endpoints.
#[derive(Clone, Default)]
pub enum ClientAuth {
    /// Public client: `client_id` in the body, nothing else.
    #[default]
    None,
    /// `Authorization: Basic` header (RFC 6749 Section 2.3.1).
    ClientSecretBasic { secret: String },
    /// `client_id` / `client_secret` form parameters.
    ClientSecretPost { secret: String },
    /// HS256 client assertion keyed with the client secret.
    ClientSecretJwt { secret: String },
    /// RS256 client assertion signed with an RSA private key.
    PrivateKeyJwt {
        private_key_pem: String,
        key_id: Option<String>,
    },
}

impl ClientAuth {
    /// The `token_endpoint_auth_method` name for this method.
    pub fn method_name(&self) -> &'static str {
        match self {
            ClientAuth::None => "none",
            ClientAuth::ClientSecretBasic { .. } => "client_secret_basic",
            ClientAuth::ClientSecretPost { .. } => "client_secret_post",
            ClientAuth::ClientSecretJwt { .. } => "client_secret_jwt",
            ClientAuth::PrivateKeyJwt { .. } => "private_key_jwt",
        }
    }

    /// Apply this method to a form POST addressed to `endpoint`.
    ///
    /// `client_id` always goes into the body. Assertions are signed per
    /// request with `endpoint` as their audience.
    pub(crate) fn apply(
        &self,
        request: RequestBuilder,
        params: &mut Vec<(&'static str, String)>,
        client_id: &str,
        endpoint: &str,
    ) -> Result<RequestBuilder, OidcError> {
        params.push(("client_id", client_id.to_string()));

        let request = match self {
            ClientAuth::None => request,
            ClientAuth::ClientSecretBasic { secret } => {
                request.header(AUTHORIZATION, basic_authorization(client_id, secret))
            }
            ClientAuth::ClientSecretPost { secret } => {
                params.push(("client_secret", secret.clone()));
                request
            }
            ClientAuth::ClientSecretJwt { secret } => {
                let key = AssertionKey::ClientSecret(secret.clone());
                push_assertion(params, &key, client_id, endpoint)?;
                request
            }
            ClientAuth::PrivateKeyJwt {
                private_key_pem,
                key_id,
            } => {
                let key = AssertionKey::RsaPrivateKey {
                    pem: private_key_pem.clone(),
                    kid: key_id.clone(),
                };
                push_assertion(params, &key, client_id, endpoint)?;
                request
            }
        };

        Ok(request)
    }
}

impl fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientAuth::PrivateKeyJwt { key_id, .. } => f
                .debug_struct("PrivateKeyJwt")
                .field("private_key_pem", &"<redacted>")
                .field("key_id", key_id)
                .finish(),
            ClientAuth::None => f.write_str("None"),
            other => write!(f, "{}(<redacted>)", other.method_name()),
        }
    }
}

fn push_assertion(
    params: &mut Vec<(&'static str, String)>,
    key: &AssertionKey,
    client_id: &str,
    endpoint: &str,
) -> Result<(), OidcError> {
    let assertion = sign_client_assertion(key, client_id, endpoint, chrono::Utc::now().timestamp())?;
    params.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()));
    params.push(("client_assertion", assertion));
    Ok(())
}

/// `Basic base64(urlencode(id) ":" urlencode(secret))`
fn basic_authorization(client_id: &str, secret: &str) -> String {
    let id: String = form_urlencoded::byte_serialize(client_id.as_bytes()).collect();
    let secret: String = form_urlencoded::byte_serialize(secret.as_bytes()).collect();
    format!("Basic {}", STANDARD.encode(format!("{}:{}", id, secret)))
}

/// Build an authenticated form POST to `endpoint`.
pub(crate) fn authenticated_form(
    http: &Client,
    endpoint: &str,
    client_id: &str,
    auth: &ClientAuth,
    mut params: Vec<(&'static str, String)>,
) -> Result<RequestBuilder, OidcError> {
    let request = auth.apply(http.post(endpoint), &mut params, client_id, endpoint)?;
    Ok(request.form(&params))
}
