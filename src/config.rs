//! Configuration loading and types for makaroni.
//!
//! Configuration is read from an optional YAML file and deserialized
//! into the [`Config`] struct.  `MKRN_*` environment variables then
//! override individual fields, and the result is validated once.  The
//! finished value is immutable and shared with handlers via
//! [`crate::AppState`].

use garde::Validate;
use serde::Deserialize;
use std::path::Path;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "MKRN_";

/// Smallest part size S3 accepts for a non-final multipart chunk.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    #[garde(dive)]
    pub server: ServerConfig,

    /// Public URLs and presentation settings.
    #[serde(default)]
    #[garde(dive)]
    pub site: SiteConfig,

    /// Object store settings.
    #[serde(default)]
    #[garde(dive)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    #[garde(skip)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    #[garde(skip)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    #[garde(length(min = 1))]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    #[garde(skip)]
    pub port: u16,

    /// Bytes of form data kept in memory.  Text fields beyond it are
    /// rejected; an uploaded file spools to disk instead.
    #[serde(default = "default_multipart_max_memory")]
    #[garde(range(min = 1))]
    pub multipart_max_memory: u64,

    /// Maximum size of a whole POST body in bytes.
    #[serde(default = "default_max_upload_size")]
    #[garde(range(min = 1))]
    pub max_upload_size: u64,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    #[garde(skip)]
    pub shutdown_timeout: u64,
}

impl ServerConfig {
    /// `host:port` string for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            multipart_max_memory: default_multipart_max_memory(),
            max_upload_size: default_max_upload_size(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Links and styling used when rendering pages.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SiteConfig {
    /// Landing page URL, linked from every rendered page.
    #[serde(default = "default_index_url")]
    #[garde(skip)]
    pub index_url: String,

    /// Public URL prefix of the bucket; result links are `prefix + key`.
    #[serde(default)]
    #[garde(skip)]
    pub result_url_prefix: String,

    /// Logo shown in page headers.
    #[serde(default)]
    #[garde(skip)]
    pub logo_url: String,

    /// Favicon URL.
    #[serde(default)]
    #[garde(skip)]
    pub favicon_url: String,

    /// Highlighting theme name.
    #[serde(default = "default_style")]
    #[garde(length(min = 1))]
    pub style: String,

    /// Directory served under `/static`.
    #[serde(default = "default_static_dir")]
    #[garde(skip)]
    pub static_dir: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
            result_url_prefix: String::new(),
            logo_url: String::new(),
            favicon_url: String::new(),
            style: default_style(),
            static_dir: default_static_dir(),
        }
    }
}

/// Object store configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StorageConfig {
    /// Backend type: `s3` or `memory`.
    #[serde(default = "default_storage_backend")]
    #[garde(pattern(r"^(s3|memory)$"))]
    pub backend: String,

    /// S3 connection settings.
    #[serde(default)]
    #[garde(dive)]
    pub s3: S3Config,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            s3: S3Config::default(),
        }
    }
}

/// S3-compatible endpoint configuration.
#[derive(Clone, Deserialize, Validate)]
pub struct S3Config {
    /// Custom S3-compatible endpoint (e.g. MinIO). Empty means AWS.
    #[serde(default)]
    #[garde(skip)]
    pub endpoint: String,
    /// Region.
    #[serde(default = "default_region")]
    #[garde(length(min = 1))]
    pub region: String,
    /// Bucket that receives every paste object.
    #[serde(default)]
    #[garde(skip)]
    pub bucket: String,
    /// Access key (falls back to the AWS credential chain when empty).
    #[serde(default)]
    #[garde(skip)]
    pub access_key_id: String,
    /// Secret key (falls back to the AWS credential chain when empty).
    #[serde(default)]
    #[garde(skip)]
    pub secret_access_key: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    #[garde(skip)]
    pub path_style: bool,
    /// Use plain HTTP for endpoints given without a scheme.
    #[serde(default)]
    #[garde(skip)]
    pub disable_ssl: bool,
    /// Per-operation timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    #[garde(range(min = 1))]
    pub timeout_secs: u64,
    /// Multipart chunk size in bytes.
    #[serde(default = "default_part_size")]
    #[garde(range(min = MIN_PART_SIZE))]
    pub part_size: u64,
    /// Parts uploaded concurrently.
    #[serde(default = "default_concurrency")]
    #[garde(range(min = 1, max = 64))]
    pub concurrency: usize,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            bucket: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            path_style: false,
            disable_ssl: false,
            timeout_secs: default_timeout_secs(),
            part_size: default_part_size(),
            concurrency: default_concurrency(),
        }
    }
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &mask_secret(&self.secret_access_key))
            .field("path_style", &self.path_style)
            .field("disable_ssl", &self.disable_ssl)
            .field("timeout_secs", &self.timeout_secs)
            .field("part_size", &self.part_size)
            .field("concurrency", &self.concurrency)
            .finish()
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
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
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
    8080
}

fn default_multipart_max_memory() -> u64 {
    32 * 1024 * 1024 // 32 MiB
}

fn default_max_upload_size() -> u64 {
    1024 * 1024 * 1024 // 1 GiB
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_index_url() -> String {
    "/".to_string()
}

fn default_style() -> String {
    "InspiredGitHub".to_string()
}

fn default_static_dir() -> String {
    "./resources/static".to_string()
}

fn default_storage_backend() -> String {
    "s3".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_part_size() -> u64 {
    MIN_PART_SIZE
}

fn default_concurrency() -> usize {
    4
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

impl Config {
    /// Apply `MKRN_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names.
    ///
    /// Variable names are `MKRN_` plus the upper-cased field name, e.g.
    /// `MKRN_S3_BUCKET` or `MKRN_RESULT_URL_PREFIX`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        // `MKRN_ADDRESS` is `host:port`; the narrower variables win.
        if let Some(v) = get("ADDRESS") {
            let (host, port) = v.rsplit_once(':').ok_or_else(|| {
                anyhow::anyhow!("{ENV_PREFIX}ADDRESS must be host:port, got {v:?}")
            })?;
            self.server.host = match host {
                "" => default_host(),
                host => host.to_string(),
            };
            self.server.port = parse_env("ADDRESS", port)?;
        }
        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = get("MULTIPART_MAX_MEMORY") {
            self.server.multipart_max_memory = parse_env("MULTIPART_MAX_MEMORY", &v)?;
        }
        if let Some(v) = get("MAX_UPLOAD_SIZE") {
            self.server.max_upload_size = parse_env("MAX_UPLOAD_SIZE", &v)?;
        }
        if let Some(v) = get("INDEX_URL") {
            self.site.index_url = v;
        }
        if let Some(v) = get("RESULT_URL_PREFIX") {
            self.site.result_url_prefix = v;
        }
        if let Some(v) = get("LOGO_URL") {
            self.site.logo_url = v;
        }
        if let Some(v) = get("FAVICON_URL") {
            self.site.favicon_url = v;
        }
        if let Some(v) = get("STYLE") {
            self.site.style = v;
        }
        if let Some(v) = get("STATIC_DIR") {
            self.site.static_dir = v;
        }
        if let Some(v) = get("STORAGE_BACKEND") {
            self.storage.backend = v;
        }
        if let Some(v) = get("S3_ENDPOINT") {
            self.storage.s3.endpoint = v;
        }
        if let Some(v) = get("S3_REGION") {
            self.storage.s3.region = v;
        }
        if let Some(v) = get("S3_BUCKET") {
            self.storage.s3.bucket = v;
        }
        if let Some(v) = get("S3_KEY_ID") {
            self.storage.s3.access_key_id = v;
        }
        if let Some(v) = get("S3_SECRET_KEY") {
            self.storage.s3.secret_access_key = v;
        }
        if let Some(v) = get("S3_PATH_STYLE") {
            self.storage.s3.path_style = parse_env("S3_PATH_STYLE", &v)?;
        }
        if let Some(v) = get("S3_DISABLE_SSL") {
            self.storage.s3.disable_ssl = parse_env("S3_DISABLE_SSL", &v)?;
        }
        if let Some(v) = get("S3_TIMEOUT_SECS") {
            self.storage.s3.timeout_secs = parse_env("S3_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("S3_PART_SIZE") {
            self.storage.s3.part_size = parse_env("S3_PART_SIZE", &v)?;
        }
        if let Some(v) = get("S3_CONCURRENCY") {
            self.storage.s3.concurrency = parse_env("S3_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("LOG_FORMAT") {
            self.logging.format = v;
        }
        Ok(())
    }

    /// Validate field ranges and cross-field requirements.
    pub fn check(&self) -> anyhow::Result<()> {
        self.validate()
            .map_err(|report| anyhow::anyhow!("invalid configuration: {report}"))?;

        if self.storage.backend == "s3" && self.storage.s3.bucket.trim().is_empty() {
            anyhow::bail!("invalid configuration: storage.s3.bucket is required for the s3 backend");
        }
        Ok(())
    }

    /// Log the effective settings at debug level with secrets masked.
    pub fn log_settings(&self) {
        tracing::debug!("Server settings: {:?}", self.server);
        tracing::debug!("Site settings: {:?}", self.site);
        tracing::debug!(
            "Storage settings: backend={} s3={:?}",
            self.storage.backend,
            self.storage.s3
        );
        tracing::debug!("Logging settings: {:?}", self.logging);
    }
}

fn parse_env<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value for {ENV_PREFIX}{name}: '{value}': {e}"))
}

/// Hide most of a secret for safe logging.
///
/// Secrets longer than six characters keep three characters at each
/// end, shorter ones keep one, and two or fewer are shown as-is.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    let len = chars.len();
    if len <= 2 {
        return secret.to_string();
    }
    let keep = if len <= 6 { 1 } else { 3 };
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[len - keep..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(len - 2 * keep))
}
