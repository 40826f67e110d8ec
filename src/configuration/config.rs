use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Deserialize;

use super::types::{ImageLimits, StorageTarget};
use crate::error_handling::types::ConfigError;

/// Application configuration structure that defines all runtime parameters.
///
/// The configuration is read from a TOML file whose path is given on the command line.
/// Every section is optional and falls back to sensible defaults, so an empty file starts a
/// local instance listening on `127.0.0.1:8080` with its data under `./instance`.
///
/// # Examples
///
/// ```
/// use sketchforge::configuration::Config;
///
/// let config = Config::from_toml_str("[server]\nport = 9000\n").unwrap();
/// assert_eq!(config.server.port, 9000);
/// ```
///
/// # Sections Overview
///
/// - `server`: bind address, port, instance directory and request limits
/// - `database`: SQLite connection url
/// - `images`: decode limits applied to every uploaded image
/// - `generation_storage` / `chat_storage`: where generated and chat images are written
/// - `provider`: generative API endpoint, model identifiers and credentials
/// - `bucket_api`: Cloud Storage endpoint and access token for the `gcs` backend
/// - `bootstrap`: optional initial administrator account
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub images: ImageLimits,
    pub generation_storage: StorageTarget,
    pub chat_storage: StorageTarget,
    pub provider: ProviderConfig,
    pub bucket_api: BucketApiConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Network address to bind the HTTP server to.
    pub bind_address: String,
    /// TCP port of the HTTP server.
    pub port: u16,
    /// Directory holding the database and local image directories.
    ///
    /// Relative `local_dir` values of the storage sections resolve against it.
    pub instance_dir: PathBuf,
    /// Maximum accepted size of a multipart request body, in bytes.
    pub max_upload_bytes: u64,
    /// Lifetime of a login token.
    pub session_ttl_hours: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            instance_dir: PathBuf::from("instance"),
            max_upload_bytes: 32 * 1024 * 1024,
            session_ttl_hours: 24 * 7,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SeaORM connection url; defaults to `sqlite://{instance_dir}/sketchforge.sqlite3?mode=rwc`
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub timeout_secs: u64,
    /// Falls back to `GEMINI_API_KEY` then `GOOGLE_API_KEY`
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            timeout_secs: 120,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BucketApiConfig {
    pub api_base: String,
    /// Falls back to `GCS_ACCESS_TOKEN`
    pub access_token: Option<String>,
}

impl Default for BucketApiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://storage.googleapis.com".to_string(),
            access_token: None,
        }
    }
}

/// Initial administrator created when the user table is empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Config {
    /// Reads and validates the configuration file at `path`.
    ///
    /// Secrets that are absent from the file are taken from the environment
    /// (see [`Config::apply_env_fallbacks`]).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        debug!("Read configuration file {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.apply_env_fallbacks();
        config.apply_storage_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Fills unset secrets from environment variables.
    pub fn apply_env_fallbacks(&mut self) {
        if self.provider.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            self.provider.api_key = non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"));
        }
        if let Some(base) = non_empty_env("GEMINI_API_BASE") {
            self.provider.api_base = base;
        }
        self.provider.api_base = self.provider.api_base.trim().trim_end_matches('/').to_string();
        if self.bucket_api.access_token.is_none() {
            self.bucket_api.access_token = non_empty_env("GCS_ACCESS_TOKEN");
        }
        if self.bootstrap.username.is_none() {
            self.bootstrap.username = non_empty_env("INITIAL_USER_USERNAME");
        }
        if self.bootstrap.email.is_none() {
            self.bootstrap.email = non_empty_env("INITIAL_USER_EMAIL");
        }
        if self.bootstrap.password.is_none() {
            self.bootstrap.password = non_empty_env("INITIAL_USER_PASSWORD");
        }
    }

    // Both targets default to the same local dir; chat images get their own.
    fn apply_storage_defaults(&mut self) {
        if self.generation_storage.prefix.is_empty() {
            self.generation_storage.prefix = "generations".to_string();
        }
        if self.chat_storage == StorageTarget::default() {
            self.chat_storage = StorageTarget::local("chat_images", "chat");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::NotInRange("server.port must be between 1 and 65535".into()));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::MissingValue("server.bind_address".into()));
        }
        if self.server.session_ttl_hours <= 0 {
            return Err(ConfigError::NotInRange("server.session_ttl_hours must be positive".into()));
        }
        for (section, target) in [
            ("generation_storage", &self.generation_storage),
            ("chat_storage", &self.chat_storage),
        ] {
            if target.backend.trim().eq_ignore_ascii_case("gcs") && target.bucket_name().is_none() {
                warn!("{}: backend is gcs but no bucket is configured, saves will fail", section);
            }
        }
        if self.provider.image_model.trim().is_empty() {
            return Err(ConfigError::MissingValue("provider.image_model".into()));
        }
        Ok(())
    }

    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) if !url.trim().is_empty() => url.clone(),
            _ => format!(
                "sqlite://{}?mode=rwc",
                self.server.instance_dir.join("sketchforge.sqlite3").display()
            ),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
