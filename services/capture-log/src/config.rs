use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration for the capture log service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Output directory configuration
    #[serde(default)]
    pub storage: StorageConfig,
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
    /// Install the Prometheus exporter
    #[serde(default)]
    pub metrics_enabled: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
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
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body, sized for base64 image uploads
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

/// Where artifacts are written and served from
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Detection log directory, served under /logs
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    /// Capture directory, served under /captures
    #[serde(default = "default_captures_dir")]
    pub captures_dir: PathBuf,
    /// Optional front-end shell; unmatched GETs fall back to its index.html
    #[serde(default)]
    pub public_dir: Option<PathBuf>,
}

// Default value functions
fn default_service_name() -> String {
    "capture-log-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_body_limit_bytes() -> usize {
    20 * 1024 * 1024 // 20MB
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_captures_dir() -> PathBuf {
    PathBuf::from("captures")
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            // Add config file if present
            .add_source(
                config::File::with_name("config/capture-log")
                    .required(false)
            )
            .add_source(
                config::File::with_name("/etc/nier/capture-log")
                    .required(false)
            )
            // Override with environment variables
            // CAPTURE_LOG__STORAGE__LOGS_DIR -> storage.logs_dir
            .add_source(
                config::Environment::with_prefix("CAPTURE_LOG")
                    .separator("__")
                    .try_parsing(true)
            )
            // Conventional PORT wins over everything else
            .set_override_option("api.port", std::env::var("PORT").ok())?
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Socket address string the API binds to
    pub fn listen_addr(&self) -> String {
        self.api.listen_addr()
    }
}

impl ApiConfig {
    /// `host:port` pair handed to the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            captures_dir: default_captures_dir(),
            public_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.api.body_limit_bytes, 20 * 1024 * 1024);
        assert_eq!(config.storage.logs_dir, PathBuf::from("logs"));
        assert_eq!(config.storage.captures_dir, PathBuf::from("captures"));
        assert!(config.storage.public_dir.is_none());
        assert!(!config.service.metrics_enabled);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "api": { "port": 9001 },
            "storage": { "logs_dir": "/var/lib/nier/logs" }
        }))
        .unwrap();

        assert_eq!(config.api.port, 9001);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.storage.logs_dir, PathBuf::from("/var/lib/nier/logs"));
        assert_eq!(config.storage.captures_dir, PathBuf::from("captures"));
        assert_eq!(config.service.name, "capture-log-service");
    }

    #[test]
    fn test_listen_addr() {
        let mut config = Config::default();
        config.api.host = "127.0.0.1".to_string();
        config.api.port = 8123;
        assert_eq!(config.listen_addr(), "127.0.0.1:8123");
        assert_eq!(config.api.listen_addr(), config.listen_addr());
    }
}
