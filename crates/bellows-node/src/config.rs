//! Node configuration.
//!
//! Defaults work out of the box; every knob can come from a TOML file or a
//! `BELLOWS_*` environment variable, with the environment winning.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `BELLOWS_HTTP_ADDR` | HTTP listen address | `127.0.0.1:8080` |
//! | `BELLOWS_SSH_ADDR` | SSH listen address | `127.0.0.1:2222` |
//! | `BELLOWS_SSH_HOST_KEY` | SSH host key path | `data/ssh/host_ed25519` |
//! | `BELLOWS_REPO_DIR` | Bare repository base | `data/repos` |
//! | `BELLOWS_LFS_DIR` | Filesystem LFS store | `data/lfs` |
//! | `BELLOWS_RECORDS_DSN` | Record store path | *(in-memory)* |
//! | `BELLOWS_LOG_LEVEL` | Log level | `info` |
//! | `BELLOWS_LOG_FORMAT` | `pretty` or `json` | `pretty` |
//! | `BELLOWS_S3_REGION` … | S3 backend settings | *(filesystem)* |

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use validator::Validate;

use bellows_blob::S3Config;

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable parsing error.
    #[error("failed to parse environment variable {key}: {message}")]
    EnvParse {
        /// Variable name.
        key: String,
        /// What went wrong.
        message: String,
    },

    /// File loading error.
    #[error("failed to load configuration file: {0}")]
    FileLoad(String),

    /// Validation error.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Main node configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct NodeConfig {
    /// HTTP transport.
    #[serde(default)]
    pub http: HttpConfig,

    /// SSH transport.
    #[serde(default)]
    pub ssh: SshListenConfig,

    /// On-disk storage roots and the record-store DSN.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Optional S3 blob backend; all-present triggers S3.
    #[serde(default)]
    pub s3: S3Options,

    /// Logging.
    #[validate(nested)]
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Listen address.
    pub addr: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".parse().expect("valid default address"),
        }
    }
}

/// SSH listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SshListenConfig {
    /// Listen address.
    pub addr: SocketAddr,
    /// Host key path; generated on first start when absent.
    pub host_key: PathBuf,
}

impl Default for SshListenConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:2222".parse().expect("valid default address"),
            host_key: PathBuf::from("data/ssh/host_ed25519"),
        }
    }
}

/// Storage roots.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Base directory for bare repositories.
    pub repo_dir: PathBuf,
    /// Filesystem LFS directory (unused when S3 is configured).
    pub lfs_dir: PathBuf,
    /// Record-store location. Absent means in-memory records and the
    /// public-only degraded mode for repositories found on disk.
    pub records_dsn: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("data/repos"),
            lfs_dir: PathBuf::from("data/lfs"),
            records_dsn: None,
        }
    }
}

/// S3 backend settings; the backend activates only when bucket, region,
/// and both credentials are present.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct S3Options {
    /// Bucket region.
    pub region: Option<String>,
    /// Bucket name.
    pub bucket: Option<String>,
    /// Custom endpoint for S3-compatible services.
    pub endpoint: Option<String>,
    /// Access key id.
    pub access_key: Option<String>,
    /// Secret access key.
    pub secret_key: Option<String>,
    /// STS session token.
    pub session_token: Option<String>,
}

impl S3Options {
    /// The complete S3 configuration, when every required field is set.
    pub fn resolve(&self) -> Option<S3Config> {
        Some(S3Config {
            bucket: self.bucket.clone()?,
            region: self.region.clone()?,
            endpoint: self.endpoint.clone(),
            access_key: self.access_key.clone()?,
            secret_key: self.secret_key.clone()?,
            session_token: self.session_token.clone(),
        })
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[validate(length(min = 1))]
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileLoad(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::FileLoad(e.to_string()))
    }

    /// Override settings from `BELLOWS_*` environment variables.
    pub fn merge_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(addr) = std::env::var("BELLOWS_HTTP_ADDR") {
            self.http.addr = parse_env("BELLOWS_HTTP_ADDR", &addr)?;
        }
        if let Ok(addr) = std::env::var("BELLOWS_SSH_ADDR") {
            self.ssh.addr = parse_env("BELLOWS_SSH_ADDR", &addr)?;
        }
        if let Ok(path) = std::env::var("BELLOWS_SSH_HOST_KEY") {
            self.ssh.host_key = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("BELLOWS_REPO_DIR") {
            self.storage.repo_dir = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("BELLOWS_LFS_DIR") {
            self.storage.lfs_dir = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("BELLOWS_RECORDS_DSN") {
            self.storage.records_dsn = Some(PathBuf::from(path));
        }
        if let Ok(level) = std::env::var("BELLOWS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("BELLOWS_LOG_FORMAT") {
            self.logging.format = format;
        }
        for (var, field) in [
            ("BELLOWS_S3_REGION", &mut self.s3.region),
            ("BELLOWS_S3_BUCKET", &mut self.s3.bucket),
            ("BELLOWS_S3_ENDPOINT", &mut self.s3.endpoint),
            ("BELLOWS_S3_ACCESS_KEY", &mut self.s3.access_key),
            ("BELLOWS_S3_SECRET_KEY", &mut self.s3.secret_key),
            ("BELLOWS_S3_SESSION_TOKEN", &mut self.s3.session_token),
        ] {
            if let Ok(value) = std::env::var(var) {
                *field = Some(value);
            }
        }
        Ok(())
    }

    /// Validate the assembled configuration.
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Validation(format!(
                "unknown log format: {}",
                self.logging.format
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::EnvParse {
        key: key.to_string(),
        message: format!("invalid value: {value}"),
    })
}
