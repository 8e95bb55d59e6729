//! Service configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! the base layer; a user config file overrides any subset of them; selected
//! environment variables (via CLI flags with `env` fallbacks) override both.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! bind = "0.0.0.0:3000"
//! allowed_origin = "http://localhost:5173"  # CORS origin of the upload UI
//! request_timeout_secs = 120
//!
//! [limits]
//! max_files = 50
//! max_file_bytes = 26214400     # 25 MiB per uploaded file
//! max_dimension = 16384         # per-axis bound on requested width/height
//! max_output_pixels = 40000000  # largest resize buffer, in pixels
//!
//! [processing]
//! max_processes = 4             # CPU workers (omit for auto = CPU cores)
//! max_concurrent_uploads = 8
//! max_in_flight = 8             # files held in memory at once (omit for 2 x workers)
//!
//! [images]
//! quality = 80                  # JPEG / AVIF quality (1-100)
//! avif_speed = 6                # rav1e speed (1 = slowest, 10 = fastest)
//! enabled_formats = ["webp", "png", "jpeg", "avif", "gif"]
//!
//! [storage]
//! backend = "local"             # "s3", "local" or "memory"
//! public_read = true
//!
//! [storage.s3]
//! bucket = ""
//! region = "eu-central-1"
//!
//! [storage.local]
//! root = "uploads"
//! public_base_url = "http://localhost:3000/uploads"
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse; override just the values you want:
//!
//! ```toml
//! [storage]
//! backend = "s3"
//!
//! [storage.s3]
//! bucket = "my-images"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{EncodeSettings, OutputFormat, Quality};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Smallest part size S3 accepts for every part but the last.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// HTTP listener and CORS settings.
    pub server: ServerConfig,
    /// Request size limits enforced while binding.
    pub limits: LimitsConfig,
    /// Worker pool and concurrency settings.
    pub processing: ProcessingConfig,
    /// Encoder settings.
    pub images: ImagesConfig,
    /// Object store selection and credentials.
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if !(1..=10).contains(&self.images.avif_speed) {
            return Err(ConfigError::Validation(
                "images.avif_speed must be 1-10".into(),
            ));
        }
        if self.images.enabled_formats.is_empty() {
            return Err(ConfigError::Validation(
                "images.enabled_formats must not be empty".into(),
            ));
        }
        if self.limits.max_files == 0 || self.limits.max_file_bytes == 0 {
            return Err(ConfigError::Validation(
                "limits.max_files and limits.max_file_bytes must be non-zero".into(),
            ));
        }
        if self.limits.max_dimension == 0 || self.limits.max_output_pixels == 0 {
            return Err(ConfigError::Validation(
                "limits.max_dimension and limits.max_output_pixels must be non-zero".into(),
            ));
        }
        if self.processing.max_concurrent_uploads == 0 {
            return Err(ConfigError::Validation(
                "processing.max_concurrent_uploads must be non-zero".into(),
            ));
        }
        if self.processing.max_in_flight == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_in_flight must be non-zero".into(),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.request_timeout_secs must be non-zero".into(),
            ));
        }
        if self.storage.backend == StorageBackend::S3 {
            let s3 = &self.storage.s3;
            if s3.bucket.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "storage.s3.bucket is required for the s3 backend".into(),
                ));
            }
            if s3.part_size < MIN_PART_SIZE {
                return Err(ConfigError::Validation(format!(
                    "storage.s3.part_size must be at least {MIN_PART_SIZE} bytes"
                )));
            }
        }
        Ok(())
    }

    /// Encoder settings shared by every conversion.
    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            quality: Quality::new(self.images.quality),
            avif_speed: self.images.avif_speed,
            enabled_formats: self.images.enabled_formats.clone(),
            max_output_pixels: self.limits.max_output_pixels,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Origin allowed by CORS. `"*"` allows any origin.
    pub allowed_origin: String,
    /// Deadline for one upload request, after which the batch is cancelled.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            allowed_origin: "http://localhost:5173".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Size limits checked before any file is converted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_files: usize,
    pub max_file_bytes: usize,
    /// Largest width or height a request may ask for.
    pub max_dimension: u32,
    /// Largest pixel buffer a resize may allocate. Guards proportional
    /// scaling, where one small bound can imply a huge other axis.
    pub max_output_pixels: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files: 50,
            max_file_bytes: 25 * 1024 * 1024,
            max_dimension: 16_384,
            max_output_pixels: 40_000_000,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Simultaneous uploads to the object store.
    pub max_concurrent_uploads: usize,
    /// Files whose source or encoded bytes may be held at once.
    /// When absent, twice the worker count.
    pub max_in_flight: Option<usize>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            max_concurrent_uploads: 8,
            max_in_flight: None,
        }
    }
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

/// Resolve how many files may be in flight at once.
pub fn effective_in_flight(config: &ProcessingConfig) -> usize {
    config
        .max_in_flight
        .unwrap_or_else(|| effective_threads(config) * 2)
        .max(1)
}

/// Encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Lossy quality for JPEG and AVIF (1-100).
    pub quality: u32,
    /// rav1e speed preset (1-10).
    pub avif_speed: u8,
    /// Target formats this deployment accepts.
    pub enabled_formats: Vec<OutputFormat>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            quality: Quality::default().value(),
            avif_speed: 6,
            enabled_formats: OutputFormat::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    #[default]
    Local,
    Memory,
}

/// Object store selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Publish uploaded objects world-readable (S3 `public-read` ACL).
    pub public_read: bool,
    pub s3: S3Config,
    pub local: LocalConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            public_read: true,
            s3: S3Config::default(),
            local: LocalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...).
    pub endpoint: Option<String>,
    /// Base URL objects are served from. When absent, the virtual-hosted
    /// bucket URL is used.
    pub public_base_url: Option<String>,
    pub force_path_style: bool,
    /// Bodies at or above this size use multipart upload.
    pub multipart_threshold: usize,
    pub part_size: usize,
    /// Static credentials. When absent, the default AWS provider chain applies.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "eu-central-1".to_string(),
            endpoint: None,
            public_base_url: None,
            force_path_style: false,
            multipart_threshold: 8 * 1024 * 1024,
            part_size: 8 * 1024 * 1024,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalConfig {
    /// Directory objects are written under.
    pub root: String,
    pub public_base_url: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root: "uploads".to_string(),
            public_base_url: "http://localhost:3000/uploads".to_string(),
        }
    }
}

// =============================================================================
// Environment / CLI overrides
// =============================================================================

/// Values that override the merged config file, usually sourced from the
/// environment (`PORT`, `DOMAIN`, `BUCKET_NAME`, `BUCKET_URL`, `AWS_PK`,
/// `AWS_SK`).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub allowed_origin: Option<String>,
    pub bucket: Option<String>,
    pub bucket_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl ConfigOverrides {
    /// Apply on top of `config`. A bucket name switches the backend to S3.
    pub fn apply(self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            let host = config
                .server
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            config.server.bind = format!("{host}:{port}");
        }
        if let Some(origin) = self.allowed_origin {
            config.server.allowed_origin = origin;
        }
        if let Some(bucket) = self.bucket {
            config.storage.backend = StorageBackend::S3;
            config.storage.s3.bucket = bucket;
        }
        if let Some(url) = self.bucket_url {
            config.storage.s3.public_base_url = Some(url);
        }
        if let Some(key) = self.access_key_id {
            config.storage.s3.access_key_id = Some(key);
        }
        if let Some(secret) = self.secret_access_key {
            config.storage.s3.secret_access_key = Some(secret);
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(AppConfig::default()).expect("default config must serialize")
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

/// Merge an optional overlay onto a base value, then deserialize.
///
/// Validation is left to the caller so environment overrides can be applied
/// first.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    Ok(config)
}

/// Load config from a `config.toml` path, or stock defaults without one.
///
/// Merges user values on top of stock defaults, applies `overrides`,
/// rejects unknown keys, and validates the result.
pub fn load_config(
    path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<AppConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = match path {
        Some(p) => load_raw_config(p)?,
        None => None,
    };
    let mut config = resolve_config(base, overlay)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# ampe-convert Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Environment variables override the file:
#   PORT         -> server.bind port
#   DOMAIN       -> server.allowed_origin
#   BUCKET_NAME  -> storage.s3.bucket (and selects the s3 backend)
#   BUCKET_URL   -> storage.s3.public_base_url
#   AWS_PK       -> storage.s3.access_key_id
#   AWS_SK       -> storage.s3.secret_access_key

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
bind = "0.0.0.0:3000"

# Origin of the upload UI allowed by CORS. "*" allows any origin.
allowed_origin = "http://localhost:5173"

# Seconds before an upload request is abandoned and its batch cancelled.
request_timeout_secs = 120

# ---------------------------------------------------------------------------
# Request limits
# ---------------------------------------------------------------------------
[limits]
# Files per upload request.
max_files = 50

# Size of a single uploaded file, in bytes (25 MiB).
max_file_bytes = 26214400

# Largest width or height a request may ask for. Larger values make the
# whole batch malformed.
max_dimension = 16384

# Largest pixel buffer a single resize may allocate (width x height of the
# scaled or padded image). Files exceeding it fail as UnsupportedTarget.
max_output_pixels = 40000000

# ---------------------------------------------------------------------------
# Parallel processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of parallel image workers.
# Omit to auto-detect (= number of CPU cores). Values above the core count
# are clamped down.
# max_processes = 4

# Simultaneous uploads to the object store.
max_concurrent_uploads = 8

# Files whose bytes may be held in memory at once.
# Omit for twice the worker count.
# max_in_flight = 8

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
[images]
# Lossy quality for JPEG and AVIF output (1-100). WebP output is lossless.
quality = 80

# AVIF encoder speed, 1 (smallest files) to 10 (fastest).
avif_speed = 6

# Target formats accepted by this deployment. Requests for any other
# format fail that file with UnsupportedTarget.
enabled_formats = ["webp", "png", "jpeg", "avif", "gif"]

# ---------------------------------------------------------------------------
# Object storage
# ---------------------------------------------------------------------------
[storage]
# "s3", "local" (files under storage.local.root) or "memory" (discarded).
backend = "local"

# Make uploaded objects world-readable (S3 public-read ACL).
public_read = true

[storage.s3]
bucket = ""
region = "eu-central-1"

# Custom endpoint for S3-compatible stores.
# endpoint = "http://localhost:9000"

# Base URL for returned object links. Defaults to the bucket's
# virtual-hosted URL.
# public_base_url = "https://cdn.example.com"

force_path_style = false

# Bodies at or above this size use multipart upload.
multipart_threshold = 8388608

# Multipart chunk size, at least 5 MiB.
part_size = 8388608

# Static credentials. Omit to use the default AWS provider chain.
# access_key_id = ""
# secret_access_key = ""

[storage.local]
root = "uploads"
public_base_url = "http://localhost:3000/uploads"
"##
}
