//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The provider client secret and the state signing key are loaded from env
//! vars or from files, never stored in the TOML directly.

use common::Secret;
use hextok_auth::{
    GITHUB_AUTHORIZE_URL, GITHUB_PROFILE_URL, GITHUB_TOKEN_URL, MOBILE_REDIRECT_URI,
    MOBILE_SCHEME, ProviderEndpoints,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub mobile: MobileConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Externally visible origin, used for the provider callback and the
    /// post-login redirect. Overridden by BASE_URL.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Set the Secure attribute on cookies. Only disable for plain-http local
    /// development.
    #[serde(default = "default_true")]
    pub secure_cookies: bool,
}

/// OAuth provider (GitHub) settings
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    /// Overridden by GITHUB_CLIENT_ID.
    #[serde(default)]
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to GITHUB_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_profile_url")]
    pub profile_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            client_secret_file: None,
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            profile_url: default_profile_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// State token signing settings
#[derive(Debug, Default, Deserialize)]
pub struct StateConfig {
    #[serde(skip)]
    pub signing_key: Option<Secret<String>>,
    /// Path to a file containing the signing key (alternative to OAUTH_STATE_KEY)
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

/// Native app login settings
#[derive(Debug, Deserialize)]
pub struct MobileConfig {
    #[serde(default = "default_mobile_redirect")]
    pub redirect_uri: String,
    #[serde(default = "default_mobile_scheme")]
    pub allowed_scheme: String,
}

impl Default for MobileConfig {
    fn default() -> Self {
        Self {
            redirect_uri: default_mobile_redirect(),
            allowed_scheme: default_mobile_scheme(),
        }
    }
}

/// Persistence settings. Without a path the store lives in memory only.
#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_authorize_url() -> String {
    GITHUB_AUTHORIZE_URL.to_string()
}

fn default_token_url() -> String {
    GITHUB_TOKEN_URL.to_string()
}

fn default_profile_url() -> String {
    GITHUB_PROFILE_URL.to_string()
}

fn default_mobile_redirect() -> String {
    MOBILE_REDIRECT_URI.to_string()
}

fn default_mobile_scheme() -> String {
    MOBILE_SCHEME.to_string()
}

/// Read a secret from `env_var`, falling back to the contents of `file`.
///
/// A whitespace-only file yields `None`. An unreadable file is an error
/// unless the env var is set.
fn resolve_secret(
    env_var: &str,
    file: Option<&Path>,
    what: &str,
) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_var) {
        return Ok(Some(Secret::new(value)));
    }
    let Some(file) = file else {
        return Ok(None);
    };
    let value = std::fs::read_to_string(file).map_err(|e| {
        common::Error::Config(format!("failed to read {what} {}: {e}", file.display()))
    })?;
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(Secret::new(value)))
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret resolution order:
    /// 1. GITHUB_CLIENT_SECRET / OAUTH_STATE_KEY env vars
    /// 2. client_secret_file / key_file paths from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(id) = std::env::var("GITHUB_CLIENT_ID") {
            config.provider.client_id = id;
        }
        if let Ok(base) = std::env::var("BASE_URL") {
            config.server.base_url = base;
        }
        config.server.base_url = config.server.base_url.trim_end_matches('/').to_string();

        config.provider.client_secret = resolve_secret(
            "GITHUB_CLIENT_SECRET",
            config.provider.client_secret_file.as_deref(),
            "client_secret_file",
        )?;
        config.state.signing_key = resolve_secret(
            "OAUTH_STATE_KEY",
            config.state.key_file.as_deref(),
            "key_file",
        )?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        // Validate base_url is a valid URL with http(s) scheme
        if !self.server.base_url.starts_with("http://")
            && !self.server.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {:?}",
                self.server.base_url
            )));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.provider.client_id.trim().is_empty() {
            return Err(common::Error::Config(
                "provider client_id is required (config or GITHUB_CLIENT_ID)".into(),
            ));
        }

        if self.provider.client_secret.as_ref().is_none_or(|s| s.is_blank()) {
            return Err(common::Error::Config(
                "provider client secret is required (GITHUB_CLIENT_SECRET or client_secret_file)"
                    .into(),
            ));
        }

        if self.provider.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        for (name, value) in [
            ("authorize_url", &self.provider.authorize_url),
            ("token_url", &self.provider.token_url),
            ("profile_url", &self.provider.profile_url),
        ] {
            url::Url::parse(value).map_err(|e| {
                common::Error::Config(format!("provider {name} is not a valid URL: {e}"))
            })?;
        }

        if self.state.signing_key.as_ref().is_none_or(|s| s.is_blank()) {
            return Err(common::Error::Config(
                "state signing key is required (OAUTH_STATE_KEY or key_file)".into(),
            ));
        }

        let scheme = self.mobile.allowed_scheme.trim();
        if scheme.is_empty() {
            return Err(common::Error::Config(
                "mobile allowed_scheme must not be empty".into(),
            ));
        }
        let redirect = url::Url::parse(&self.mobile.redirect_uri).map_err(|e| {
            common::Error::Config(format!("mobile redirect_uri is not a valid URL: {e}"))
        })?;
        if !redirect.scheme().eq_ignore_ascii_case(scheme) {
            return Err(common::Error::Config(format!(
                "mobile redirect_uri must use the {scheme}:// scheme, got: {}",
                self.mobile.redirect_uri
            )));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("hextok-auth.toml")
    }

    /// Redirect URI registered with the provider. Web and mobile logins share it.
    pub fn callback_url(&self) -> String {
        format!("{}/oauth/callback/github", self.server.base_url)
    }

    /// Where a browser lands after a successful web login.
    pub fn post_login_url(&self) -> String {
        format!("{}/", self.server.base_url)
    }

    pub fn provider_endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints {
            authorize_url: self.provider.authorize_url.clone(),
            token_url: self.provider.token_url.clone(),
            profile_url: self.provider.profile_url.clone(),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }
}
