use anyhow::{bail, Context, Result};
use axum::http::HeaderValue;
use directories::ProjectDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder signing secret used when none is configured in development.
pub const INSECURE_DEV_SECRET: &str = "dev-secret-change-me";

/// Environment variable carrying the session signing secret.
pub const SECRET_ENV: &str = "STATEKEEP_SECRET";
/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "PORT";
/// Environment variable overriding the state directory.
pub const DATA_DIR_ENV: &str = "STATEKEEP_DATA_DIR";
/// Environment variable selecting `development` or `production`.
pub const ENVIRONMENT_ENV: &str = "STATEKEEP_ENV";

const DEFAULT_SESSION_TTL_SECS: u64 = 31 * 24 * 3600;

// ── Top-level config ────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    /// Deployment mode. `production` refuses to start without a signing secret.
    pub environment: Environment,
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

// ── Gateway ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to call `/api/*` with credentials.
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            allowed_origins: vec![
                "http://localhost:5500".into(),
                "http://127.0.0.1:5500".into(),
            ],
            max_body_bytes: 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

// ── Auth ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AuthConfig {
    /// The single account allowed to log in.
    pub username: String,
    pub password: String,
    /// HMAC key for session cookies. Prefer `STATEKEEP_SECRET` over the file.
    pub secret_key: Option<String>,
    pub session_ttl_secs: u64,
    pub cookie_name: String,
    /// Add the `Secure` attribute to the session cookie (HTTPS deployments).
    pub cookie_secure: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: "test-user".into(),
            password: "password".into(),
            secret_key: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            cookie_name: "session".into(),
            cookie_secure: false,
        }
    }
}

// ── Storage ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// When false, an unparseable state file reads as `null` instead of an error.
    pub strict_reads: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            strict_reads: true,
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────

impl Config {
    /// Default config file location (`<config_dir>/statekeep/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "statekeep").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path` (or the default location when it exists), apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::resolve(path, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// File (or defaults) plus environment overrides, without validation.
    /// Lets `config show` print a configuration that would refuse to serve.
    pub fn resolve(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides(lookup)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Environment wins over the config file. `lookup` is injectable for tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        if let Some(secret) = non_empty(SECRET_ENV) {
            self.auth.secret_key = Some(secret);
        }
        if let Some(port) = non_empty(PORT_ENV) {
            self.gateway.port = port
                .parse()
                .with_context(|| format!("{PORT_ENV} must be a port number, got {port:?}"))?;
        }
        if let Some(dir) = non_empty(DATA_DIR_ENV) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(env) = non_empty(ENVIRONMENT_ENV) {
            self.environment = Environment::parse(&env).with_context(|| {
                format!("{ENVIRONMENT_ENV} must be 'development' or 'production', got {env:?}")
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let username = self.auth.username.trim();
        if username.is_empty() {
            bail!("auth.username cannot be empty");
        }
        if crate::storage::sanitize_identity(username).is_empty() {
            bail!("auth.username {username:?} has no alphanumeric, '-' or '_' characters");
        }
        if self.auth.session_ttl_secs == 0 {
            bail!("auth.session_ttl_secs must be greater than zero");
        }
        if self.auth.cookie_name.trim().is_empty()
            || self
                .auth
                .cookie_name
                .contains(|c: char| c.is_whitespace() || matches!(c, ';' | '=' | ','))
        {
            bail!("auth.cookie_name {:?} is not a valid cookie name", self.auth.cookie_name);
        }
        if self.gateway.max_body_bytes == 0 {
            bail!("gateway.max_body_bytes must be greater than zero");
        }
        if self.gateway.request_timeout_secs == 0 {
            bail!("gateway.request_timeout_secs must be greater than zero");
        }
        for origin in &self.gateway.allowed_origins {
            HeaderValue::from_str(origin)
                .with_context(|| format!("gateway.allowed_origins entry {origin:?} is invalid"))?;
        }
        if self.environment == Environment::Production && self.configured_secret().is_none() {
            bail!(
                "No session secret configured. Set {SECRET_ENV} or auth.secret_key \
                 (required when environment = \"production\")."
            );
        }
        Ok(())
    }

    fn configured_secret(&self) -> Option<&str> {
        self.auth
            .secret_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The signing secret, falling back to the development placeholder.
    /// The flag is true when the placeholder is in use.
    pub fn session_secret(&self) -> (&str, bool) {
        match self.configured_secret() {
            Some(secret) => (secret, false),
            None => (INSECURE_DEV_SECRET, true),
        }
    }

    /// TOML rendering with the secret and password redacted.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        redacted.auth.password = "***".into();
        if redacted.auth.secret_key.is_some() {
            redacted.auth.secret_key = Some("***".into());
        }
        toml::to_string_pretty(&redacted).context("Failed to serialize config")
    }

    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(Config);
        serde_json::to_string_pretty(&schema).context("Failed to serialize config schema")
    }
}
