//! Configuration loading for the Scholaris client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use scholaris_cache::CacheConfig;
use scholaris_core::UploadPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScholarisConfig {
    pub api_base_url: String,
    pub auth: AuthConfig,
    pub request_timeout_ms: u64,
    pub cache: CacheSettings,
    pub upload: UploadSettings,
    pub notifications: NotificationSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub api_key: Option<String>,
    pub jwt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub stale_time_ms: u64,
    pub refetch_on_invalidate: bool,
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadSettings {
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationSettings {
    pub max_visible: usize,
    pub ttl_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `"scholaris_cache=debug,info"`.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or SCHOLARIS_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ScholarisConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ScholarisConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.api_base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.auth.api_key.is_none() && self.auth.jwt.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "auth",
                reason: "api_key or jwt must be provided".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.event_capacity",
                reason: "must be > 0".to_string(),
            });
        }
        if self.upload.max_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "upload.max_bytes",
                reason: "must be > 0".to_string(),
            });
        }
        if self.upload.allowed_content_types.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "upload.allowed_content_types",
                reason: "must list at least one type".to_string(),
            });
        }
        if let Some(bad) = self
            .upload
            .allowed_content_types
            .iter()
            .find(|t| !t.contains('/'))
        {
            return Err(ConfigError::InvalidValue {
                field: "upload.allowed_content_types",
                reason: format!("'{}' is not a media type", bad),
            });
        }
        if self.notifications.max_visible == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notifications.max_visible",
                reason: "must be > 0".to_string(),
            });
        }
        if self.notifications.ttl_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notifications.ttl_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_stale_time(Duration::from_millis(self.cache.stale_time_ms))
            .with_refetch_on_invalidate(self.cache.refetch_on_invalidate)
            .with_event_capacity(self.cache.event_capacity)
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_bytes: self.upload.max_bytes,
            allowed_content_types: self.upload.allowed_content_types.clone(),
        }
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("SCHOLARIS_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"
api_base_url = "https://api.scholaris.app"
request_timeout_ms = 10000

[auth]
jwt = "token"

[cache]
stale_time_ms = 30000
refetch_on_invalidate = true
event_capacity = 128

[upload]
max_bytes = 5242880
allowed_content_types = ["image/*", "application/pdf"]

[notifications]
max_visible = 3
ttl_ms = 5000

[logging]
filter = "scholaris_cache=debug,info"
json = false
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(VALID);
        let config = ScholarisConfig::from_path(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        let cache = config.cache_config();
        assert_eq!(cache.stale_time, Duration::from_secs(30));
        assert_eq!(cache.event_capacity, 128);
        assert_eq!(config.upload_policy().max_bytes, 5_242_880);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let file = write_config(&format!("{}\nretries = 3\n", VALID));
        assert!(matches!(
            ScholarisConfig::from_path(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_credentials_is_invalid() {
        let file = write_config(&VALID.replace("jwt = \"token\"", ""));
        let config = ScholarisConfig::from_path(file.path()).unwrap();
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "auth"),
            other => panic!("Expected auth error, got: {:?}", other),
        }
    }

    #[test]
    fn test_bad_content_type_is_invalid() {
        let file = write_config(&VALID.replace("\"application/pdf\"", "\"pdf\""));
        let config = ScholarisConfig::from_path(file.path()).unwrap();
        match config.validate() {
            Err(ConfigError::InvalidValue { field, reason }) => {
                assert_eq!(field, "upload.allowed_content_types");
                assert!(reason.contains("pdf"));
            }
            other => panic!("Expected content type error, got: {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            ScholarisConfig::from_path(&missing),
            Err(ConfigError::Io(_))
        ));
    }
}
