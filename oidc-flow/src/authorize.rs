//! Authorization request construction (OpenID Connect Core §3.1.2.1).
//!
//! Building a URL is pure: no I/O, and identical inputs give identical URLs.
//! `state`, `nonce` and the PKCE challenge always come from the
//! [`FlowSession`], never from caller-supplied parameters.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::OidcError;
use crate::session::FlowSession;

/// Parameters the builder owns; callers cannot override them via `extra_params`.
const RESERVED_PARAMS: &[&str] = &[
    "response_type",
    "client_id",
    "redirect_uri",
    "scope",
    "state",
    "nonce",
    "code_challenge",
    "code_challenge_method",
    "display",
    "prompt",
    "max_age",
    "ui_locales",
    "claims",
    "login_hint",
    "acr_values",
    "id_token_hint",
];

fn default_response_type() -> String {
    "code".to_string()
}

fn default_require_openid() -> bool {
    true
}

/// Authorization request options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub authorization_endpoint: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,

    #[serde(default = "default_response_type")]
    pub response_type: String,

    /// `page`, `popup`, `touch` or `wap`
    #[serde(default)]
    pub display: Option<String>,

    /// Space-separated: `none`, `login`, `consent`, `select_account`
    #[serde(default)]
    pub prompt: Option<String>,

    /// Maximum authentication age in seconds
    #[serde(default)]
    pub max_age: Option<u64>,

    #[serde(default)]
    pub ui_locales: Option<String>,

    /// Claims request object (OIDC Core §5.5), serialized as JSON
    #[serde(default)]
    pub claims: Option<serde_json::Value>,

    #[serde(default)]
    pub login_hint: Option<String>,

    #[serde(default)]
    pub acr_values: Option<String>,

    #[serde(default)]
    pub id_token_hint: Option<String>,

    /// Reject scopes without `openid`
    #[serde(default = "default_require_openid")]
    pub require_openid: bool,

    /// Provider-specific parameters, appended after the standard ones
    #[serde(default)]
    pub extra_params: Vec<(String, String)>,
}

impl AuthorizationRequest {
    pub fn new(
        authorization_endpoint: &str,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
    ) -> Self {
        Self {
            authorization_endpoint: authorization_endpoint.to_string(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scope: scope.to_string(),
            response_type: default_response_type(),
            display: None,
            prompt: None,
            max_age: None,
            ui_locales: None,
            claims: None,
            login_hint: None,
            acr_values: None,
            id_token_hint: None,
            require_openid: true,
            extra_params: Vec::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(prompt.to_string());
        self
    }

    pub fn with_display(mut self, display: &str) -> Self {
        self.display = Some(display.to_string());
        self
    }

    pub fn with_max_age(mut self, max_age: u64) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_ui_locales(mut self, ui_locales: &str) -> Self {
        self.ui_locales = Some(ui_locales.to_string());
        self
    }

    pub fn with_claims(mut self, claims: serde_json::Value) -> Self {
        self.claims = Some(claims);
        self
    }

    pub fn with_login_hint(mut self, login_hint: &str) -> Self {
        self.login_hint = Some(login_hint.to_string());
        self
    }

    pub fn with_acr_values(mut self, acr_values: &str) -> Self {
        self.acr_values = Some(acr_values.to_string());
        self
    }

    pub fn with_id_token_hint(mut self, id_token_hint: &str) -> Self {
        self.id_token_hint = Some(id_token_hint.to_string());
        self
    }

    /// Allow plain OAuth 2.0 scopes without `openid`.
    pub fn oauth_only(mut self) -> Self {
        self.require_openid = false;
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.extra_params.push((key.to_string(), value.to_string()));
        self
    }

    /// Build the authorization URL for `session`.
    pub fn build_url(&self, session: &FlowSession) -> Result<Url, OidcError> {
        self.check()?;

        let mut url = Url::parse(&self.authorization_endpoint).map_err(|e| {
            OidcError::Configuration(format!("invalid authorization endpoint: {}", e))
        })?;

        if let Some((key, _)) = url
            .query_pairs()
            .find(|(key, _)| RESERVED_PARAMS.contains(&key.as_ref()))
        {
            return Err(OidcError::Configuration(format!(
                "authorization endpoint already carries reserved parameter '{}'",
                key
            )));
        }

        let claims = self
            .claims
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| OidcError::Configuration(format!("invalid claims request: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", &self.response_type)
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("scope", &self.scope)
                .append_pair("state", session.state())
                .append_pair("nonce", session.nonce());

            if let Some(pkce) = session.pkce() {
                query
                    .append_pair("code_challenge", pkce.challenge())
                    .append_pair("code_challenge_method", pkce.method());
            }

            let max_age = self.max_age.map(|age| age.to_string());
            let optional = [
                ("display", self.display.as_deref()),
                ("prompt", self.prompt.as_deref()),
                ("max_age", max_age.as_deref()),
                ("ui_locales", self.ui_locales.as_deref()),
                ("claims", claims.as_deref()),
                ("login_hint", self.login_hint.as_deref()),
                ("acr_values", self.acr_values.as_deref()),
                ("id_token_hint", self.id_token_hint.as_deref()),
            ];
            for (key, value) in optional {
                if let Some(value) = value {
                    query.append_pair(key, value);
                }
            }

            for (key, value) in &self.extra_params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    fn check(&self) -> Result<(), OidcError> {
        if self.client_id.trim().is_empty() {
            return Err(OidcError::Configuration("client_id is empty".to_string()));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(OidcError::Configuration("redirect_uri is empty".to_string()));
        }
        if self.response_type.trim().is_empty() {
            return Err(OidcError::Configuration(
                "response_type is empty".to_string(),
            ));
        }
        if self.require_openid && !self.scope.split_whitespace().any(|s| s == "openid") {
            return Err(OidcError::Configuration(format!(
                "scope '{}' must include 'openid' for an OpenID Connect request",
                self.scope
            )));
        }
        if let Some((key, _)) = self
            .extra_params
            .iter()
            .find(|(key, _)| RESERVED_PARAMS.contains(&key.as_str()))
        {
            return Err(OidcError::Configuration(format!(
                "parameter '{}' is set by the request builder",
                key
            )));
        }
        Ok(())
    }
}

/// Build the authorization URL for `request` and `session`.
pub fn build(request: &AuthorizationRequest, session: &FlowSession) -> Result<Url, OidcError> {
    request.build_url(session)
}
