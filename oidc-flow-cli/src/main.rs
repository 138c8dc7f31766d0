//! oidc-flow: command-line front end for the oidc-flow client core
//!
//! Drives device login, authorization URLs, code exchange, refresh, client
//! credentials, introspection, revocation and offline ID token validation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use oidc_flow::{
    AuthorizationCallback, AuthorizationRequest, ClientConfig, ConfigError,
    DeviceAuthorizationSession, DeviceFlowEvent, DeviceFlowOutcome, DevicePoller, ExpectedClaims,
    FlowSession, IdTokenValidator, IntrospectionClient, PollerConfig, ProviderMetadata,
    RevocationClient, StaticKeyResolver, TokenClient, TokenSet, TokenTypeHint,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "oidc-flow")]
#[command(about = "OAuth 2.0 / OpenID Connect client")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/oidc-flow/config.yaml, then env)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// IdP issuer URL, overriding the config
    #[arg(long, global = true)]
    issuer: Option<String>,

    /// OAuth client ID, overriding the config
    #[arg(long, global = true)]
    client_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate using the device authorization flow
    Login {
        /// JWK Set file used to validate the returned ID token
        #[arg(long)]
        jwks: Option<PathBuf>,

        /// Stop waiting after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print an authorization URL and save the flow session
    AuthorizeUrl {
        /// Where to write the session (state, nonce, PKCE verifier)
        #[arg(long)]
        session_file: PathBuf,

        #[arg(long)]
        redirect_uri: Option<String>,

        #[arg(long)]
        prompt: Option<String>,

        #[arg(long)]
        login_hint: Option<String>,
    },

    /// Exchange the code from a redirect URL for tokens
    Exchange {
        /// Session file written by authorize-url
        #[arg(long)]
        session_file: PathBuf,

        /// Full redirect URL the browser landed on
        callback_url: String,

        #[arg(long)]
        redirect_uri: Option<String>,

        /// JWK Set file used to validate the returned ID token
        #[arg(long)]
        jwks: Option<PathBuf>,
    },

    /// Use a refresh token to obtain new tokens
    Refresh {
        refresh_token: String,

        #[arg(long)]
        scope: Option<String>,
    },

    /// Obtain a token with the client credentials grant
    ClientCredentials {
        #[arg(long)]
        scope: Option<String>,
    },

    /// Ask the IdP whether a token is active
    Introspect {
        token: String,

        /// access_token or refresh_token
        #[arg(long)]
        hint: Option<TokenTypeHint>,
    },

    /// Revoke a token
    Revoke {
        token: String,

        /// access_token or refresh_token
        #[arg(long)]
        hint: Option<TokenTypeHint>,
    },

    /// Validate an ID token offline against a JWK Set file
    Validate {
        id_token: String,

        #[arg(long)]
        jwks: PathBuf,

        #[arg(long)]
        nonce: Option<String>,

        #[arg(long)]
        max_age: Option<u64>,
    },
}

/// Endpoint locations after applying config overrides to discovery.
struct Endpoints {
    authorization: Option<String>,
    token: String,
    device_authorization: Option<String>,
    revocation: Option<String>,
    introspection: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("oidc_flow=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config, cli.issuer, cli.client_id)?;

    match cli.command {
        Commands::Login { jwks, timeout } => run_login(&config, jwks, timeout).await,

        Commands::AuthorizeUrl {
            session_file,
            redirect_uri,
            prompt,
            login_hint,
        } => run_authorize_url(&config, &session_file, redirect_uri, prompt, login_hint).await,

        Commands::Exchange {
            session_file,
            callback_url,
            redirect_uri,
            jwks,
        } => run_exchange(&config, &session_file, &callback_url, redirect_uri, jwks).await,

        Commands::Refresh {
            refresh_token,
            scope,
        } => run_refresh(&config, &refresh_token, scope).await,

        Commands::ClientCredentials { scope } => run_client_credentials(&config, scope).await,

        Commands::Introspect { token, hint } => run_introspect(&config, &token, hint).await,

        Commands::Revoke { token, hint } => run_revoke(&config, &token, hint).await,

        Commands::Validate {
            id_token,
            jwks,
            nonce,
            max_age,
        } => run_validate(&config, &id_token, &jwks, nonce, max_age).await,
    }
}

fn load_config(
    path: Option<PathBuf>,
    issuer: Option<String>,
    client_id: Option<String>,
) -> anyhow::Result<ClientConfig> {
    let default_path = ClientConfig::default_config_path();
    resolve_config(path.as_deref(), &default_path, issuer, client_id)
}

/// Config file (explicit, then default), else environment; flags win over both.
fn resolve_config(
    path: Option<&Path>,
    default_path: &Path,
    issuer: Option<String>,
    client_id: Option<String>,
) -> anyhow::Result<ClientConfig> {
    let file = path.or_else(|| default_path.exists().then_some(default_path));

    let mut config = match file {
        Some(file) => ClientConfig::from_file(file)
            .with_context(|| format!("failed to load config from {}", file.display()))?,
        None => match ClientConfig::from_env() {
            Ok(config) => config,
            Err(ConfigError::MissingEnvVar(name)) => {
                let issuer = issuer.clone().or_else(|| std::env::var("OIDC_ISSUER").ok());
                let client_id = client_id
                    .clone()
                    .or_else(|| std::env::var("OIDC_CLIENT_ID").ok());
                let (Some(issuer), Some(client_id)) = (issuer, client_id) else {
                    anyhow::bail!(
                        "no configuration found ({} not set). Use --config, --issuer/--client-id or set OIDC_ISSUER",
                        name
                    );
                };
                let mut config = ClientConfig::new(&issuer, &client_id);
                config.apply_env()?;
                config
            }
            Err(e) => return Err(e.into()),
        },
    };

    if let Some(issuer) = issuer {
        config.issuer = issuer;
    }
    if let Some(client_id) = client_id {
        config.client_id = client_id;
    }
    config.validate()?;
    Ok(config)
}

/// Fill endpoints from discovery unless the config names all of them.
async fn resolve_endpoints(config: &ClientConfig) -> anyhow::Result<Endpoints> {
    let overrides = &config.endpoints;
    let complete = overrides.authorization.is_some()
        && overrides.token.is_some()
        && overrides.device_authorization.is_some()
        && overrides.revocation.is_some()
        && overrides.introspection.is_some();

    let metadata = if complete {
        None
    } else {
        match ProviderMetadata::discover(&config.issuer).await {
            Ok(metadata) => Some(metadata),
            Err(e) if overrides.token.is_some() => {
                warn!(issuer = %config.issuer, error = %e, "Discovery failed, using configured endpoints");
                None
            }
            Err(e) => return Err(e).context("OIDC discovery failed"),
        }
    };

    let pick = |configured: &Option<String>, discovered: Option<&Option<String>>| {
        configured
            .clone()
            .or_else(|| discovered.and_then(|d| d.clone()))
    };

    let token = overrides
        .token
        .clone()
        .or_else(|| metadata.as_ref().map(|m| m.token_endpoint.clone()))
        .ok_or_else(|| anyhow::anyhow!("token endpoint not configured"))?;

    Ok(Endpoints {
        authorization: overrides
            .authorization
            .clone()
            .or_else(|| metadata.as_ref().map(|m| m.authorization_endpoint.clone())),
        token,
        device_authorization: pick(
            &overrides.device_authorization,
            metadata.as_ref().map(|m| &m.device_authorization_endpoint),
        ),
        revocation: pick(
            &overrides.revocation,
            metadata.as_ref().map(|m| &m.revocation_endpoint),
        ),
        introspection: pick(
            &overrides.introspection,
            metadata.as_ref().map(|m| &m.introspection_endpoint),
        ),
    })
}

fn token_client(config: &ClientConfig, endpoints: &Endpoints) -> anyhow::Result<TokenClient> {
    let mut client = TokenClient::new(&endpoints.token, &config.client_id, config.client_auth()?)?;
    if let Some(ref device) = endpoints.device_authorization {
        client = client.with_device_authorization_endpoint(device);
    }
    Ok(client)
}

fn load_validator(config: &ClientConfig, jwks: &Path) -> anyhow::Result<IdTokenValidator> {
    let json = std::fs::read_to_string(jwks)
        .with_context(|| format!("failed to read JWK Set {}", jwks.display()))?;
    let resolver = StaticKeyResolver::from_jwk_set_json(&config.issuer, &json)?;
    Ok(IdTokenValidator::with_config(
        Arc::new(resolver),
        config.validation_config(),
    ))
}

async fn validate_id_token(
    config: &ClientConfig,
    tokens: &TokenSet,
    jwks: Option<PathBuf>,
    nonce: Option<&str>,
) -> anyhow::Result<()> {
    let Some(jwks) = jwks else {
        return Ok(());
    };
    let id_token = tokens
        .id_token()
        .ok_or_else(|| anyhow::anyhow!("no id_token in token response"))?;

    let validator = load_validator(config, &jwks)?;
    let mut expected = ExpectedClaims::new(&config.issuer, &config.client_id);
    if let Some(nonce) = nonce {
        expected = expected.with_nonce(nonce);
    }

    let decoded = validator.validate(id_token, &expected).await?;
    info!(sub = %decoded.payload.sub, "ID token validated");
    Ok(())
}

fn print_tokens(tokens: &TokenSet) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(tokens)?);
    Ok(())
}

/// Authenticate with the IdP using device flow
async fn run_login(
    config: &ClientConfig,
    jwks: Option<PathBuf>,
    timeout: Option<u64>,
) -> anyhow::Result<()> {
    let endpoints = resolve_endpoints(config).await?;
    if endpoints.device_authorization.is_none() {
        anyhow::bail!("IdP does not support device authorization");
    }
    let client = token_client(config, &endpoints)?;

    info!(issuer = %config.issuer, "Starting device flow authentication");
    println!("Starting device authorization flow with: {}", config.issuer);
    println!("Client ID: {}", config.client_id);
    println!();

    let poller = DevicePoller::new(
        Arc::new(client),
        PollerConfig {
            scope: config.scope.clone(),
            timeout: timeout.map(Duration::from_secs),
        },
    );
    let mut handle = poller.start();
    let mut shown = false;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(DeviceFlowEvent::Pending(session)) if !shown => {
                    print_device_instructions(&session);
                    shown = true;
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                break;
            }
        }
    }

    match handle.outcome().await {
        DeviceFlowOutcome::Authorized(tokens) => {
            println!("Authentication successful!");
            validate_id_token(config, &tokens, jwks, None).await?;
            print_tokens(&tokens)
        }
        DeviceFlowOutcome::Denied => Err(anyhow::anyhow!("Authorization denied by user")),
        DeviceFlowOutcome::Expired => Err(anyhow::anyhow!("Device code expired")),
        DeviceFlowOutcome::Error(e) => Err(e.into()),
        DeviceFlowOutcome::Cancelled => Err(anyhow::anyhow!("Login cancelled")),
    }
}

fn print_device_instructions(session: &DeviceAuthorizationSession) {
    let verification_uri = session.verification_uri();
    let user_code = session.user_code();

    println!("┌──────────────────────────────────────────────────────────┐");
    println!("│                   Device Authorization                   │");
    println!("├──────────────────────────────────────────────────────────┤");
    println!("│                                                          │");
    println!("│  1. Open your browser to:                                │");
    println!(
        "│     {}{}│",
        verification_uri,
        " ".repeat(53 - verification_uri.chars().count().min(53))
    );
    println!("│                                                          │");
    println!(
        "│  2. Enter the code:  {}{}│",
        user_code,
        " ".repeat(37 - user_code.chars().count().min(37))
    );
    println!("│                                                          │");
    if let Some(complete_uri) = session.verification_uri_complete() {
        println!("│  Or visit directly:                                      │");
        let uri_display = if complete_uri.chars().count() > 50 {
            format!("{}...", complete_uri.chars().take(47).collect::<String>())
        } else {
            complete_uri.to_string()
        };
        println!(
            "│     {}{}│",
            uri_display,
            " ".repeat(53 - uri_display.chars().count().min(53))
        );
        println!("│                                                          │");
    }
    let expiry = format!("Code expires in {} seconds", session.expires_in());
    println!("│  {}{}│", expiry, " ".repeat(56 - expiry.len().min(56)));
    println!("└──────────────────────────────────────────────────────────┘");
    println!();
    println!("Waiting for authentication...");
}

async fn run_authorize_url(
    config: &ClientConfig,
    session_file: &Path,
    redirect_uri: Option<String>,
    prompt: Option<String>,
    login_hint: Option<String>,
) -> anyhow::Result<()> {
    let redirect_uri = redirect_uri
        .or_else(|| config.redirect_uri.clone())
        .ok_or_else(|| anyhow::anyhow!("redirect_uri not configured. Use --redirect-uri"))?;
    let endpoints = resolve_endpoints(config).await?;
    let authorization = endpoints
        .authorization
        .ok_or_else(|| anyhow::anyhow!("authorization endpoint not configured"))?;

    let session = FlowSession::new(config.session_ttl()?)?;
    let mut request =
        AuthorizationRequest::new(&authorization, &config.client_id, &redirect_uri, &config.scope);
    if let Some(ref prompt) = prompt {
        request = request.with_prompt(prompt);
    }
    if let Some(ref hint) = login_hint {
        request = request.with_login_hint(hint);
    }
    let url = request.build_url(&session)?;

    write_session(session_file, &session)?;
    info!(path = %session_file.display(), "Flow session saved");

    println!("{}", url);
    Ok(())
}

/// The session holds the PKCE verifier, so the file is owner-only.
fn write_session(path: &Path, session: &FlowSession) -> anyhow::Result<()> {
    let json = serde_json::to_string(session)?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

async fn run_exchange(
    config: &ClientConfig,
    session_file: &Path,
    callback_url: &str,
    redirect_uri: Option<String>,
    jwks: Option<PathBuf>,
) -> anyhow::Result<()> {
    let redirect_uri = redirect_uri
        .or_else(|| config.redirect_uri.clone())
        .ok_or_else(|| anyhow::anyhow!("redirect_uri not configured. Use --redirect-uri"))?;

    let json = std::fs::read_to_string(session_file)
        .with_context(|| format!("failed to read session {}", session_file.display()))?;
    let session: FlowSession = serde_json::from_str(&json)?;

    let callback = AuthorizationCallback::from_redirect_url(callback_url)?;
    session.check_callback(&callback)?;
    if let Some(ref iss) = callback.issuer {
        if iss.trim_end_matches('/') != config.issuer.trim_end_matches('/') {
            anyhow::bail!("callback issuer {} does not match {}", iss, config.issuer);
        }
    }

    let endpoints = resolve_endpoints(config).await?;
    let client = token_client(config, &endpoints)?;
    let nonce = session.nonce().to_string();

    let tokens = client
        .exchange_authorization_code(&callback.code, session, &redirect_uri)
        .await?;
    if let Err(e) = std::fs::remove_file(session_file) {
        warn!(path = %session_file.display(), error = %e, "Failed to remove used session file");
    }

    validate_id_token(config, &tokens, jwks, Some(&nonce)).await?;
    print_tokens(&tokens)
}

async fn run_refresh(
    config: &ClientConfig,
    refresh_token: &str,
    scope: Option<String>,
) -> anyhow::Result<()> {
    let endpoints = resolve_endpoints(config).await?;
    let client = token_client(config, &endpoints)?;

    info!("Refreshing token");
    let tokens = client.refresh_token(refresh_token, scope.as_deref()).await?;
    print_tokens(&tokens)
}

async fn run_client_credentials(config: &ClientConfig, scope: Option<String>) -> anyhow::Result<()> {
    let endpoints = resolve_endpoints(config).await?;
    let client = token_client(config, &endpoints)?;

    let scope = scope.or_else(|| Some(config.scope.clone()));
    let tokens = client.client_credentials(scope.as_deref()).await?;
    print_tokens(&tokens)
}

async fn run_introspect(
    config: &ClientConfig,
    token: &str,
    hint: Option<TokenTypeHint>,
) -> anyhow::Result<()> {
    let endpoints = resolve_endpoints(config).await?;
    let introspection = endpoints
        .introspection
        .clone()
        .ok_or_else(|| anyhow::anyhow!("IdP does not advertise an introspection endpoint"))?;
    let client = IntrospectionClient::new(token_client(config, &endpoints)?, &introspection);

    let response = client.introspect(token, hint).await?;
    if !response.active {
        println!("Token is not active");
    }
    println!("{}", serde_json::to_string_pretty(&response.raw)?);
    Ok(())
}

async fn run_revoke(
    config: &ClientConfig,
    token: &str,
    hint: Option<TokenTypeHint>,
) -> anyhow::Result<()> {
    let endpoints = resolve_endpoints(config).await?;
    let revocation = endpoints
        .revocation
        .clone()
        .ok_or_else(|| anyhow::anyhow!("IdP does not advertise a revocation endpoint"))?;
    let client = RevocationClient::new(token_client(config, &endpoints)?, &revocation);

    client.revoke(token, hint).await?;
    println!("Token revoked");
    Ok(())
}

async fn run_validate(
    config: &ClientConfig,
    id_token: &str,
    jwks: &Path,
    nonce: Option<String>,
    max_age: Option<u64>,
) -> anyhow::Result<()> {
    let validator = load_validator(config, jwks)?;

    let mut expected = ExpectedClaims::new(&config.issuer, &config.client_id);
    if let Some(ref nonce) = nonce {
        expected = expected.with_nonce(nonce);
    }
    if let Some(max_age) = max_age {
        expected = expected.with_max_age(max_age);
    }

    let decoded = validator.validate(id_token, &expected).await?;
    println!("{}", serde_json::to_string_pretty(&decoded.payload)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oidc_flow::AuthMethod;
    use tempfile::TempDir;

    const FILE_CONFIG: &str = r#"
issuer: https://file.example
client_id: file-client
auth_method: private_key_jwt
private_key_path: /etc/oidc-flow/client.pem
redirect_uri: http://localhost:8400/callback
scope: openid profile
endpoints:
  token: https://file.example/token
"#;

    #[test]
    fn test_flags_override_default_config_file() {
        let dir = TempDir::new().unwrap();
        let default_path = dir.path().join("config.yaml");
        std::fs::write(&default_path, FILE_CONFIG).unwrap();

        let config = resolve_config(
            None,
            &default_path,
            Some("https://flag.example".into()),
            Some("flag-client".into()),
        )
        .unwrap();

        assert_eq!(config.issuer, "https://flag.example");
        assert_eq!(config.client_id, "flag-client");
        // Everything else still comes from the file
        assert_eq!(config.effective_auth_method(), AuthMethod::PrivateKeyJwt);
        assert_eq!(
            config.endpoints.token.as_deref(),
            Some("https://file.example/token")
        );
        assert_eq!(
            config.redirect_uri.as_deref(),
            Some("http://localhost:8400/callback")
        );
        assert_eq!(config.scope, "openid profile");
    }

    #[test]
    fn test_explicit_config_file_used_before_default() {
        let dir = TempDir::new().unwrap();
        let default_path = dir.path().join("config.yaml");
        std::fs::write(
            &default_path,
            "issuer: https://default.example\nclient_id: default-client\n",
        )
        .unwrap();
        let explicit = dir.path().join("explicit.yaml");
        std::fs::write(&explicit, FILE_CONFIG).unwrap();

        let config = resolve_config(Some(&explicit), &default_path, None, None).unwrap();
        assert_eq!(config.issuer, "https://file.example");
        assert_eq!(config.client_id, "file-client");
    }

    #[test]
    fn test_flags_alone_when_no_source_exists() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("config.yaml");

        let config = resolve_config(
            None,
            &missing,
            Some("https://flag.example".into()),
            Some("flag-client".into()),
        )
        .unwrap();
        assert_eq!(config.issuer, "https://flag.example");
        assert_eq!(config.client_id, "flag-client");
    }

    #[test]
    fn test_invalid_issuer_flag_rejected() {
        let dir = TempDir::new().unwrap();
        let default_path = dir.path().join("config.yaml");
        std::fs::write(&default_path, FILE_CONFIG).unwrap();

        assert!(resolve_config(None, &default_path, Some("not a url".into()), None).is_err());
    }
}
