use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the catalog service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// On-disk collection configuration
    #[serde(default)]
    pub data: DataConfig,
    /// S3 configuration for poster uploads
    pub s3: S3Config,
    /// PDF export configuration
    #[serde(default)]
    pub pdf: PdfConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Expose the Prometheus exporter
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Identity stamped onto every request context
    #[serde(default = "default_user")]
    pub default_user: String,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS and the origin allow list
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Directory served as static files at the root
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    /// Request body limit for poster uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Location of the JSON collection documents
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Directory holding the collection files
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    /// File name of the media collection
    #[serde(default = "default_medias_file")]
    pub medias_file: String,
    /// File name of the review collection
    #[serde(default = "default_reviews_file")]
    pub reviews_file: String,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket receiving poster uploads
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Key prefix for poster objects
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Public base URL for uploaded objects (CDN, bucket website)
    pub public_base_url: Option<String>,
}

/// PDF export configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PdfConfig {
    /// Timeout for downloading the poster image
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Largest poster body read into memory; bigger posters are skipped
    #[serde(default = "default_max_poster_bytes")]
    pub max_poster_bytes: usize,
}

// Default value functions
fn default_service_name() -> String {
    "catalog-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_user() -> String {
    "anonymous".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3001
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_medias_file() -> String {
    "medias.json".to_string()
}

fn default_reviews_file() -> String {
    "reviews.json".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_key_prefix() -> String {
    "posters".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_max_poster_bytes() -> usize {
    10 * 1024 * 1024
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "catalog-service")?
            .set_default("service.log_level", "info")?
            .add_source(config::File::with_name("config/catalog").required(false))
            .add_source(config::File::with_name("/etc/catalog/catalog").required(false))
            // CATALOG__API__PORT -> api.port
            // CATALOG__API__CORS_ORIGINS=http://a,http://b -> api.cors_origins
            .add_source(
                config::Environment::with_prefix("CATALOG")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("api.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get the poster fetch timeout as Duration
    pub fn pdf_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.pdf.fetch_timeout_secs)
    }
}

impl DataConfig {
    pub fn medias_path(&self) -> PathBuf {
        self.dir.join(&self.medias_file)
    }

    pub fn reviews_path(&self) -> PathBuf {
        self.dir.join(&self.reviews_file)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            metrics_port: default_metrics_port(),
            default_user: default_user(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            public_dir: default_public_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            medias_file: default_medias_file(),
            reviews_file: default_reviews_file(),
        }
    }
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_poster_bytes: default_max_poster_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_api_port(), 3001);
        assert_eq!(default_fetch_timeout_secs(), 10);
        assert_eq!(default_max_poster_bytes(), 10 * 1024 * 1024);
        assert_eq!(default_key_prefix(), "posters");
    }

    #[test]
    fn test_data_paths() {
        let data = DataConfig {
            dir: PathBuf::from("/var/lib/catalog"),
            ..Default::default()
        };

        assert_eq!(data.medias_path(), PathBuf::from("/var/lib/catalog/medias.json"));
        assert_eq!(data.reviews_path(), PathBuf::from("/var/lib/catalog/reviews.json"));
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let raw = serde_json::json!({
            "s3": { "bucket": "posters" }
        });

        let config: Config = serde_json::from_value(raw).unwrap();
        assert_eq!(config.s3.bucket, "posters");
        assert_eq!(config.s3.region, "us-east-1");
        assert_eq!(config.api.port, 3001);
        assert!(config.api.cors_origins.is_empty());
        assert_eq!(config.service.default_user, "anonymous");
    }
}
