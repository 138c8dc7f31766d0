//! Client configuration

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OidcError;
use crate::oidc::ValidationConfig;
use crate::session::DEFAULT_SESSION_TTL_SECS;
use crate::token::ClientAuth;

/// Client authentication method, as named in provider metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[default]
    None,
    ClientSecretBasic,
    ClientSecretPost,
    ClientSecretJwt,
    PrivateKeyJwt,
}

impl FromStr for AuthMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AuthMethod::None),
            "client_secret_basic" => Ok(AuthMethod::ClientSecretBasic),
            "client_secret_post" => Ok(AuthMethod::ClientSecretPost),
            "client_secret_jwt" => Ok(AuthMethod::ClientSecretJwt),
            "private_key_jwt" => Ok(AuthMethod::PrivateKeyJwt),
            other => Err(ConfigError::Invalid(format!(
                "unknown auth method: {}",
                other
            ))),
        }
    }
}

/// Explicit endpoint locations; any left unset come from discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointOverrides {
    #[serde(default)]
    pub authorization: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub device_authorization: Option<String>,
    #[serde(default)]
    pub revocation: Option<String>,
    #[serde(default)]
    pub introspection: Option<String>,
}

/// OAuth client configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// OIDC issuer URL
    pub issuer: String,

    /// OAuth client ID
    pub client_id: String,

    #[serde(default)]
    pub redirect_uri: Option<String>,

    #[serde(default = "default_scope")]
    pub scope: String,

    /// Defaults to client_secret_post when a secret is configured,
    /// private_key_jwt when a key is, none otherwise
    #[serde(default)]
    pub auth_method: Option<AuthMethod>,

    #[serde(default)]
    pub client_secret: Option<String>,

    /// PEM-encoded RSA private key for private_key_jwt
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// `kid` placed in client assertion headers
    #[serde(default)]
    pub key_id: Option<String>,

    #[serde(default)]
    pub endpoints: EndpointOverrides,

    /// Clock skew tolerance for ID token time checks, in seconds
    #[serde(default)]
    pub clock_skew_secs: i64,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: i64,
}

/// Longest accepted authorization session lifetime (one day)
pub const MAX_SESSION_TTL_SECS: i64 = 24 * 60 * 60;

fn default_scope() -> String {
    "openid".to_string()
}

fn default_session_ttl() -> i64 {
    DEFAULT_SESSION_TTL_SECS
}

impl ClientConfig {
    /// Minimal public-client configuration.
    pub fn new(issuer: &str, client_id: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            client_id: client_id.to_string(),
            redirect_uri: None,
            scope: default_scope(),
            auth_method: None,
            client_secret: None,
            private_key_path: None,
            key_id: None,
            endpoints: EndpointOverrides::default(),
            clock_skew_secs: 0,
            session_ttl_secs: default_session_ttl(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let issuer = required_env("OIDC_ISSUER")?;
        let client_id = required_env("OIDC_CLIENT_ID")?;

        let mut config = Self::new(&issuer, &client_id);
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the optional `OIDC_*` variables that are set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(secret) = std::env::var("OIDC_CLIENT_SECRET") {
            self.client_secret = Some(secret);
        }
        if let Ok(redirect_uri) = std::env::var("OIDC_REDIRECT_URI") {
            self.redirect_uri = Some(redirect_uri);
        }
        if let Ok(scope) = std::env::var("OIDC_SCOPE") {
            self.scope = scope;
        }
        if let Ok(method) = std::env::var("OIDC_AUTH_METHOD") {
            self.auth_method = Some(method.parse()?);
        }
        if let Ok(skew) = std::env::var("OIDC_CLOCK_SKEW") {
            self.clock_skew_secs = skew.parse().map_err(|_| {
                ConfigError::Invalid(format!("OIDC_CLOCK_SKEW is not a number: {}", skew))
            })?;
        }
        Ok(())
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("~/.config"));
        config_dir.join("oidc-flow").join("config.yaml")
    }

    /// Load from default locations (file first, then env)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            Self::from_file(&config_path)
        } else {
            Self::from_env()
        }
    }

    /// Reject values no flow can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::Invalid("client_id must not be empty".into()));
        }
        if self.clock_skew_secs < 0 {
            return Err(ConfigError::Invalid("clock_skew_secs must not be negative".into()));
        }
        if self.session_ttl_secs <= 0 || self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "session_ttl_secs must be between 1 and {}",
                MAX_SESSION_TTL_SECS
            )));
        }
        url::Url::parse(&self.issuer)
            .map_err(|e| ConfigError::Invalid(format!("invalid issuer {}: {}", self.issuer, e)))?;
        Ok(())
    }

    /// The configured method, or the one implied by the credentials present.
    pub fn effective_auth_method(&self) -> AuthMethod {
        match (self.auth_method, &self.client_secret, &self.private_key_path) {
            (Some(method), _, _) => method,
            (None, Some(_), _) => AuthMethod::ClientSecretPost,
            (None, None, Some(_)) => AuthMethod::PrivateKeyJwt,
            (None, None, None) => AuthMethod::None,
        }
    }

    /// Build the client authentication, reading the private key if needed.
    pub fn client_auth(&self) -> Result<ClientAuth, ConfigError> {
        let secret = || {
            self.client_secret.clone().ok_or_else(|| {
                ConfigError::Invalid("client_secret is required for this auth method".into())
            })
        };

        Ok(match self.effective_auth_method() {
            AuthMethod::None => ClientAuth::None,
            AuthMethod::ClientSecretBasic => ClientAuth::ClientSecretBasic { secret: secret()? },
            AuthMethod::ClientSecretPost => ClientAuth::ClientSecretPost { secret: secret()? },
            AuthMethod::ClientSecretJwt => ClientAuth::ClientSecretJwt { secret: secret()? },
            AuthMethod::PrivateKeyJwt => {
                let path = self.private_key_path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("private_key_path is required for private_key_jwt".into())
                })?;
                ClientAuth::PrivateKeyJwt {
                    private_key_pem: std::fs::read_to_string(path)?,
                    key_id: self.key_id.clone(),
                }
            }
        })
    }

    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            clock_skew_secs: self.clock_skew_secs,
            ..ValidationConfig::default()
        }
    }

    pub fn session_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        match self.session_ttl_secs {
            secs @ 1..=MAX_SESSION_TTL_SECS => Ok(chrono::Duration::seconds(secs)),
            other => Err(ConfigError::Invalid(format!(
                "session_ttl_secs out of range: {}",
                other
            ))),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .field("auth_method", &self.auth_method)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("private_key_path", &self.private_key_path)
            .field("key_id", &self.key_id)
            .field("endpoints", &self.endpoints)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .finish()
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<ConfigError> for OidcError {
    fn from(e: ConfigError) -> Self {
        OidcError::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, content).unwrap();
        config_path
    }

    #[test]
    fn test_config_from_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(
            &temp_dir,
            r#"
issuer: https://idp.example.com/realms/corp
client_id: my-app
redirect_uri: http://localhost:8400/callback
scope: openid profile email
auth_method: client_secret_basic
client_secret: s3cret
clock_skew_secs: 30
endpoints:
  token: https://idp.example.com/custom/token
"#,
        );

        let config = ClientConfig::from_file(&config_path).unwrap();

        assert_eq!(config.issuer, "https://idp.example.com/realms/corp");
        assert_eq!(config.client_id, "my-app");
        assert_eq!(config.scope, "openid profile email");
        assert_eq!(config.auth_method, Some(AuthMethod::ClientSecretBasic));
        assert_eq!(
            config.endpoints.token.as_deref(),
            Some("https://idp.example.com/custom/token")
        );
        assert_eq!(config.validation_config().clock_skew_secs, 30);
        assert!(matches!(
            config.client_auth().unwrap(),
            ClientAuth::ClientSecretBasic { .. }
        ));
    }

    #[test]
    fn test_config_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(
            &temp_dir,
            r#"
issuer: https://idp.example.com
client_id: my-app
"#,
        );

        let config = ClientConfig::from_file(&config_path).unwrap();

        assert_eq!(config.scope, "openid");
        assert_eq!(config.clock_skew_secs, 0);
        assert_eq!(config.session_ttl().unwrap(), chrono::Duration::minutes(10));
        assert_eq!(config.effective_auth_method(), AuthMethod::None);
    }

    #[test]
    fn test_implied_auth_method() {
        let mut config = ClientConfig::new("https://idp.example.com", "my-app");
        config.client_secret = Some("s3cret".into());
        assert_eq!(config.effective_auth_method(), AuthMethod::ClientSecretPost);

        config.client_secret = None;
        config.private_key_path = Some(PathBuf::from("/nonexistent/key.pem"));
        assert_eq!(config.effective_auth_method(), AuthMethod::PrivateKeyJwt);
        assert!(matches!(config.client_auth(), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_private_key_read_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let key_path = temp_dir.path().join("client.pem");
        std::fs::write(&key_path, include_str!("../tests/fixtures/rsa2048-private.pem")).unwrap();

        let mut config = ClientConfig::new("https://idp.example.com", "my-app");
        config.private_key_path = Some(key_path);
        config.key_id = Some("client-key-1".into());

        match config.client_auth().unwrap() {
            ClientAuth::PrivateKeyJwt {
                private_key_pem,
                key_id,
            } => {
                assert!(private_key_pem.contains("BEGIN PRIVATE KEY"));
                assert_eq!(key_id.as_deref(), Some("client-key-1"));
            }
            other => panic!("unexpected auth: {:?}", other),
        }
    }

    #[test]
    fn test_secret_required_for_secret_methods() {
        let mut config = ClientConfig::new("https://idp.example.com", "my-app");
        config.auth_method = Some(AuthMethod::ClientSecretJwt);
        assert!(matches!(config.client_auth(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(
            &temp_dir,
            r#"
issuer: https://idp.example.com
client_id: my-app
session_ttl_secs: 0
"#,
        );
        assert!(matches!(
            ClientConfig::from_file(&config_path),
            Err(ConfigError::Invalid(_))
        ));

        let config_path = write_config(
            &temp_dir,
            r#"
issuer: https://idp.example.com
client_id: my-app
session_ttl_secs: 9223372036854775807
"#,
        );
        assert!(matches!(
            ClientConfig::from_file(&config_path),
            Err(ConfigError::Invalid(_))
        ));

        let config_path = write_config(&temp_dir, "issuer: not a url\nclient_id: my-app\n");
        assert!(ClientConfig::from_file(&config_path).is_err());

        let config_path = write_config(&temp_dir, "auth_method: [\n");
        assert!(matches!(
            ClientConfig::from_file(&config_path),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_session_ttl() {
        let mut config = ClientConfig::new("https://idp.example.com", "my-app");
        assert_eq!(config.session_ttl().unwrap(), chrono::Duration::seconds(600));

        config.session_ttl_secs = i64::MAX;
        assert!(matches!(config.session_ttl(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_auth_method_from_str() {
        assert_eq!(
            "private_key_jwt".parse::<AuthMethod>().unwrap(),
            AuthMethod::PrivateKeyJwt
        );
        assert!("tls_client_auth".parse::<AuthMethod>().is_err());
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("OIDC_ISSUER", "https://idp.example.com/realms/test");
        std::env::set_var("OIDC_CLIENT_ID", "env-client");
        std::env::set_var("OIDC_AUTH_METHOD", "client_secret_post");
        std::env::set_var("OIDC_CLIENT_SECRET", "env-secret");
        std::env::set_var("OIDC_CLOCK_SKEW", "15");

        let config = ClientConfig::from_env().unwrap();

        assert_eq!(config.issuer, "https://idp.example.com/realms/test");
        assert_eq!(config.client_id, "env-client");
        assert_eq!(config.auth_method, Some(AuthMethod::ClientSecretPost));
        assert_eq!(config.clock_skew_secs, 15);

        // Cleanup
        for name in [
            "OIDC_ISSUER",
            "OIDC_CLIENT_ID",
            "OIDC_AUTH_METHOD",
            "OIDC_CLIENT_SECRET",
            "OIDC_CLOCK_SKEW",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let mut config = ClientConfig::new("https://idp.example.com", "my-app");
        config.client_secret = Some("s3cret".into());
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
