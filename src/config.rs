//! Service configuration module.
//!
//! Handles loading, validating, and merging `pixelvault.toml`. Stock defaults
//! are the base layer; a user file overrides any subset of keys; a handful of
//! environment variables override the result.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! environment = "development"  # or "production" (hides the port in URLs)
//! api_version = "v1"           # Path segment in public URLs
//!
//! [server]
//! host = "localhost"           # Host used when no request host is known
//! port = 3000
//! secure = false               # Build https URLs
//!
//! [storage]
//! root = "uploads"             # Directory holding artifact bytes
//! database = "pixelvault.db"   # SQLite metadata store
//!
//! [upload]
//! normalize_threshold = 102400 # Buffers at or above this are downscaled
//! normalize_width = 800        # Target width for downscaled uploads
//! max_size = 500000            # Transport-level upload limit (bytes)
//!
//! [encoding]
//! jpeg_quality = 80            # 1-100
//!
//! [processing]
//! max_processes = 4            # Max parallel upload workers (omit for auto = CPU cores)
//! ```
//!
//! ## Environment Overrides
//!
//! | Variable | Overrides |
//! |---|---|
//! | `STORAGE_PATH` | `storage.root` |
//! | `PORT` | `server.port` |
//! | `APP_ENV` | `environment` |
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{NormalizeConfig, Quality};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default config file name looked up by the binary.
pub const CONFIG_FILE_NAME: &str = "pixelvault.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Deployment environment. Only production hides the port in public URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "development" => Some(Environment::Development),
            "production" => Some(Environment::Production),
            _ => None,
        }
    }
}

/// Service configuration loaded from `pixelvault.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub environment: Environment,
    /// Version segment of public URLs (`/api/{api_version}/...`).
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub encoding: EncodingConfig,
    pub processing: ProcessingConfig,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            api_version: default_api_version(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            upload: UploadConfig::default(),
            encoding: EncodingConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version.is_empty() || self.api_version.contains('/') {
            return Err(ConfigError::Validation(
                "api_version must be a non-empty path segment".into(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must be non-zero".into()));
        }
        if self.storage.root.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.root must not be empty".into(),
            ));
        }
        if self.storage.database.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.database must not be empty".into(),
            ));
        }
        if self.upload.normalize_width == 0 {
            return Err(ConfigError::Validation(
                "upload.normalize_width must be non-zero".into(),
            ));
        }
        if self.upload.max_size == 0 {
            return Err(ConfigError::Validation(
                "upload.max_size must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.encoding.jpeg_quality) {
            return Err(ConfigError::Validation(
                "encoding.jpeg_quality must be 1-100".into(),
            ));
        }
        Ok(())
    }

    /// Apply `STORAGE_PATH`, `PORT` and `APP_ENV` from `lookup`, then re-validate.
    ///
    /// Takes a lookup function so tests don't have to touch the process
    /// environment; the binary passes `|k| std::env::var(k).ok()`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("STORAGE_PATH") {
            self.storage.root = root;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Validation(format!("PORT is not a valid port: {port}")))?;
        }
        if let Some(env) = lookup("APP_ENV") {
            self.environment = Environment::parse(&env).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "APP_ENV must be development or production, got {env}"
                ))
            })?;
        }
        self.validate()
    }

    pub fn normalize_config(&self) -> NormalizeConfig {
        NormalizeConfig {
            threshold: self.upload.normalize_threshold,
            width: self.upload.normalize_width,
        }
    }

    pub fn jpeg_quality(&self) -> Quality {
        Quality::new(self.encoding.jpeg_quality)
    }
}

/// Public endpoint settings used for URL construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Whether requests reach the service over TLS.
    pub secure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            secure: false,
        }
    }
}

/// Where artifact bytes and metadata live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub root: String,
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "uploads".to_string(),
            database: "pixelvault.db".to_string(),
        }
    }
}

/// Upload normalization and transport limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Buffers at or above this many bytes are downscaled.
    pub normalize_threshold: u64,
    /// Width downscaled uploads are brought to.
    pub normalize_width: u32,
    /// Largest upload the transport accepts, in bytes.
    pub max_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let normalize = NormalizeConfig::default();
        Self {
            normalize_threshold: normalize.threshold,
            normalize_width: normalize.width,
            max_size: 500_000,
        }
    }
}

/// Encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    pub jpeg_quality: u32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: Quality::default().value(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel upload workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ServiceConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ServiceConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ServiceConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `pixelvault.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixelvault Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Environment variables override the file:
#   STORAGE_PATH -> storage.root
#   PORT         -> server.port
#   APP_ENV      -> environment
#
# Unknown keys will cause an error.

# "development" or "production". Production URLs omit the port.
environment = "development"

# Version segment of public URLs: {scheme}://{host}[:{port}]/api/{api_version}/{file}
api_version = "v1"

# ---------------------------------------------------------------------------
# Public endpoint
# ---------------------------------------------------------------------------
[server]
# Host used in URLs when no request host is supplied.
host = "localhost"
port = 3000

# Build https URLs.
secure = false

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Directory holding artifact bytes. Created on first use.
root = "uploads"

# SQLite database holding users and image records.
database = "pixelvault.db"

# ---------------------------------------------------------------------------
# Uploads
# ---------------------------------------------------------------------------
[upload]
# Uploads at or above this many bytes are downscaled to normalize_width.
# Images already that narrow are stored as-is.
normalize_threshold = 102400
normalize_width = 800

# Largest accepted upload, in bytes. Enforced by the CLI before ingestion.
max_size = 500000

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
[encoding]
# JPEG encoding quality (1 = worst, 100 = best).
jpeg_quality = 80

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel upload workers. Omit to use all CPU cores.
# Values above the core count are clamped down.
# max_processes = 4
"##
}
