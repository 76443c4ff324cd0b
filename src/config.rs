//! Configuration loading and types for DocVault.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, authentication, metadata persistence, blob
//! storage, outgoing mail, logging, and observability.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication / authorization settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Metadata store settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Blob storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outgoing mail settings.
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + health probes).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL, used when building verification
    /// and download links (e.g. `https://files.example.com`).
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Maximum accepted upload size in bytes (default 50 MiB).
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            shutdown_timeout: default_shutdown_timeout(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign session tokens. Must be set to a non-trivial
    /// value in production; the default exists only for local development.
    #[serde(default = "default_secret_key")]
    pub secret_key: String,

    /// Signature algorithm for session tokens (HMAC family only).
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Session token lifetime in minutes.
    #[serde(default = "default_token_expire_minutes")]
    pub token_expire_minutes: u64,

    /// Optional ops-user seed, applied idempotently on every startup.
    ///
    /// Elevation through the API requires an already-elevated caller, so
    /// without a seed no ops user can ever exist.
    #[serde(default)]
    pub bootstrap: Option<BootstrapConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: default_secret_key(),
            algorithm: default_algorithm(),
            token_expire_minutes: default_token_expire_minutes(),
            bootstrap: None,
        }
    }
}

/// Seed account created (or elevated) at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Email of the seed account.
    pub email: String,
    /// Plaintext password, hashed before storage. Only used when the
    /// account does not exist yet.
    pub password: String,
    /// Display name for a newly created seed account.
    #[serde(default = "default_bootstrap_name")]
    pub full_name: String,
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Backend type: `sqlite` or `memory`.
    #[serde(default = "default_metadata_engine")]
    pub engine: String,

    /// SQLite-specific configuration.
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            engine: default_metadata_engine(),
            sqlite: SqliteConfig::default(),
        }
    }
}

/// SQLite-specific metadata configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_metadata_path")]
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
        }
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    /// Local storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory for uploaded blobs.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// Outgoing mail configuration.
///
/// All five fields must be present for SMTP delivery; otherwise mail
/// degrades to a log line carrying the verification URL.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SmtpConfig {
    /// SMTP relay hostname.
    pub host: Option<String>,
    /// SMTP relay port (STARTTLS).
    pub port: Option<u16>,
    /// SMTP username.
    pub username: Option<String>,
    /// SMTP password.
    pub password: Option<String>,
    /// Sender address for verification mail.
    pub from_email: Option<String>,
}

impl SmtpConfig {
    /// Whether every field needed for SMTP delivery is configured.
    pub fn is_configured(&self) -> bool {
        self.host.is_some()
            && self.port.is_some()
            && self.username.is_some()
            && self.password.is_some()
            && self.from_email.is_some()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
///
/// Controls Prometheus metrics collection and the `/health` probe.
/// Both are enabled by default.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` probe.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9444
}

fn default_public_url() -> String {
    "http://localhost:9444".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_upload_size() -> usize {
    52_428_800 // 50 MiB
}

fn default_secret_key() -> String {
    "docvault-dev-secret".to_string()
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_token_expire_minutes() -> u64 {
    30
}

fn default_bootstrap_name() -> String {
    "Operations".to_string()
}

fn default_metadata_engine() -> String {
    "sqlite".to_string()
}

fn default_metadata_path() -> String {
    "./data/metadata.db".to_string()
}

fn default_storage_root() -> String {
    "./data/uploads".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

// -- Tests --------------------------------------------------------------------
