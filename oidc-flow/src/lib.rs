//! # oidc-flow - OAuth 2.0 / OpenID Connect client core
//!
//! Protocol and crypto logic for an OAuth 2.0 / OIDC relying party:
//!
//! - **PKCE** (RFC 7636, `S256` only) verifier/challenge generation
//! - **Authorization requests** with `state`, `nonce` and PKCE drawn from a
//!   per-flow [`FlowSession`]
//! - **Token exchange** for the authorization code, refresh token, client
//!   credentials and device code grants, with `none`, `client_secret_basic`,
//!   `client_secret_post`, `client_secret_jwt` and `private_key_jwt` client
//!   authentication
//! - **Device authorization** (RFC 8628) as a cancellable background poller
//! - **ID token validation** per OpenID Connect Core 1.0 Section 3.1.3.7,
//!   with verification keys supplied by a caller-provided [`KeyResolver`]
//! - **Introspection** (RFC 7662) and **revocation** (RFC 7009)
//!
//! ## Authorization code flow
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use oidc_flow::{
//!     AuthorizationCallback, AuthorizationRequest, ClientAuth, ExpectedClaims, FlowSession,
//!     IdTokenValidator, StaticKeyResolver, TokenClient,
//! };
//!
//! # async fn run(jwks_json: &str, redirect: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let session = FlowSession::new(chrono::Duration::minutes(10))?;
//! let request = AuthorizationRequest::new(
//!     "https://idp.example/authorize",
//!     "client123",
//!     "http://localhost:8400/callback",
//!     "openid profile",
//! );
//! println!("Open {}", request.build_url(&session)?);
//!
//! // ... the browser comes back to the redirect URI ...
//! let callback = AuthorizationCallback::from_redirect_url(redirect)?;
//! session.check_callback(&callback)?;
//! let nonce = session.nonce().to_string();
//!
//! let client = TokenClient::new("https://idp.example/token", "client123", ClientAuth::None)?;
//! let tokens = client
//!     .exchange_authorization_code(&callback.code, session, "http://localhost:8400/callback")
//!     .await?;
//!
//! let resolver = StaticKeyResolver::from_jwk_set_json("https://idp.example", jwks_json)?;
//! let validator = IdTokenValidator::new(Arc::new(resolver));
//! let expected = ExpectedClaims::new("https://idp.example", "client123").with_nonce(&nonce);
//! if let Some(id_token) = tokens.id_token() {
//!     let decoded = validator.validate(id_token, &expected).await?;
//!     println!("Signed in as {}", decoded.payload.sub);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Device flow
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use oidc_flow::{ClientAuth, DeviceFlowEvent, DevicePoller, PollerConfig, TokenClient};
//!
//! # async fn run() -> Result<(), oidc_flow::OidcError> {
//! let client = TokenClient::new("https://idp.example/token", "client123", ClientAuth::None)?
//!     .with_device_authorization_endpoint("https://idp.example/device");
//!
//! let mut handle = DevicePoller::new(Arc::new(client), PollerConfig::default()).start();
//! while let Some(event) = handle.next_event().await {
//!     if let DeviceFlowEvent::Pending(session) = event {
//!         println!("Visit {} and enter {}", session.verification_uri(), session.user_code());
//!     }
//! }
//! let outcome = handle.outcome().await;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Considerations
//!
//! - A [`FlowSession`] is consumed by the code exchange, so its PKCE verifier
//!   cannot be sent twice.
//! - `state` and `nonce` are compared in constant time.
//! - Client secrets, private keys, verifiers, device codes and tokens are
//!   redacted from `Debug` output and never logged.
//! - `alg: none` and algorithms outside the configured allow-list are
//!   rejected before any key is looked up.

pub mod authorize;
pub mod config;
pub mod crypto;
pub mod device_flow;
pub mod discovery;
pub mod error;
pub mod introspection;
pub mod oidc;
pub mod pkce;
pub mod revocation;
pub mod session;
pub mod token;

pub use authorize::{build, AuthorizationRequest};
pub use config::{AuthMethod, ClientConfig, ConfigError};
pub use device_flow::{
    DeviceAuthorizationSession, DeviceFlowEvent, DeviceFlowOutcome, DeviceGrant, DevicePollHandle,
    DevicePoller, DeviceStatus, PollerConfig,
};
pub use discovery::ProviderMetadata;
pub use error::OidcError;
pub use introspection::{IntrospectionClient, IntrospectionResponse};
pub use oidc::{
    DecodedIdToken, ExpectedClaims, IdTokenValidationError, IdTokenValidator, KeyResolver,
    StaticKeyResolver, ValidationConfig, ValidationReason,
};
pub use pkce::PkcePair;
pub use revocation::RevocationClient;
pub use session::{AuthorizationCallback, FlowSession};
pub use token::{ClientAuth, TokenClient, TokenSet, TokenTypeHint};
