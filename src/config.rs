//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.
//! Settings are built once and handed to the client and controllers; there
//! is no global configuration state.

use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::models::MAX_PAGE_SIZE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for crate::error::AppError {
    fn from(err: ConfigError) -> Self {
        crate::error::AppError::Config(err.to_string())
    }
}

/// Server-side feature flags the front-end reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
    /// Import/export of dashboards and datasets as versioned bundles
    VersionedExport,
    /// Card views show rendered thumbnails
    Thumbnails,
}

impl FeatureFlag {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "VERSIONED_EXPORT" => Some(FeatureFlag::VersionedExport),
            "THUMBNAILS" => Some(FeatureFlag::Thumbnails),
            _ => None,
        }
    }
}

/// The set of enabled feature flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    enabled: HashSet<FeatureFlag>,
}

impl FeatureFlags {
    pub fn new(flags: impl IntoIterator<Item = FeatureFlag>) -> Self {
        Self {
            enabled: flags.into_iter().collect(),
        }
    }

    /// Parse a comma separated list such as `VERSIONED_EXPORT,THUMBNAILS`.
    /// Unknown names are logged and skipped.
    pub fn parse_list(list: &str) -> Self {
        let enabled = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|name| {
                let flag = FeatureFlag::parse(name);
                if flag.is_none() {
                    warn!("Ignoring unknown feature flag: {}", name);
                }
                flag
            })
            .collect();
        Self { enabled }
    }

    pub fn is_enabled(&self, flag: FeatureFlag) -> bool {
        self.enabled.contains(&flag)
    }
}

/// API connection configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_provider: String,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:8088/").expect("static url"),
            username: None,
            password: None,
            auth_provider: "db".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// List view configuration
#[derive(Debug, Clone)]
pub struct ListConfig {
    pub default_page_size: u32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_page_size: 25,
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub api: ApiConfig,
    pub list: ListConfig,
    pub features: FeatureFlags,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let base_url = match std::env::var("SUPERSET_URL") {
            Ok(raw) => Self::parse_base_url(&raw)?,
            Err(_) => ApiConfig::default().base_url,
        };

        let api = ApiConfig {
            base_url,
            username: std::env::var("SUPERSET_USERNAME").ok(),
            password: std::env::var("SUPERSET_PASSWORD").ok(),
            auth_provider: std::env::var("SUPERSET_AUTH_PROVIDER")
                .unwrap_or_else(|_| ApiConfig::default().auth_provider),
            timeout: std::env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or_else(|| ApiConfig::default().timeout),
        };

        if api.username.is_some() && api.password.is_none() {
            return Err(ConfigError::MissingVar("SUPERSET_PASSWORD".to_string()));
        }

        let default_page_size = match std::env::var("DEFAULT_PAGE_SIZE") {
            Ok(raw) => Self::parse_page_size(&raw)?,
            Err(_) => ListConfig::default().default_page_size,
        };

        let features = std::env::var("FEATURE_FLAGS")
            .map(|s| FeatureFlags::parse_list(&s))
            .unwrap_or_default();

        Ok(Self {
            api,
            list: ListConfig { default_page_size },
            features,
        })
    }

    /// Parse the server root. A trailing slash is added so relative API
    /// paths join underneath it.
    fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
        let mut url = Url::parse(raw.trim())
            .map_err(|e| ConfigError::InvalidValue(format!("SUPERSET_URL: {}", e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(
                "SUPERSET_URL must be an http(s) URL".to_string(),
            ));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    fn parse_page_size(raw: &str) -> Result<u32, ConfigError> {
        match raw.trim().parse::<u32>() {
            Ok(size) if (1..=MAX_PAGE_SIZE).contains(&size) => Ok(size),
            _ => Err(ConfigError::InvalidValue(format!(
                "DEFAULT_PAGE_SIZE must be between 1 and {}",
                MAX_PAGE_SIZE
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_api_config() {
        let config = ApiConfig::default();
        assert_eq!(config.base_url.as_str(), "http://localhost:8088/");
        assert_eq!(config.auth_provider, "db");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_default_list_config() {
        assert_eq!(ListConfig::default().default_page_size, 25);
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = Settings::parse_base_url("https://bi.example.com/superset").unwrap();
        assert_eq!(url.as_str(), "https://bi.example.com/superset/");
        assert_eq!(
            url.join("api/v1/dashboard/").unwrap().as_str(),
            "https://bi.example.com/superset/api/v1/dashboard/"
        );
        assert!(Settings::parse_base_url("ftp://bi.example.com").is_err());
        assert!(Settings::parse_base_url("not a url").is_err());
    }

    #[test]
    fn test_page_size_bounds() {
        assert_eq!(Settings::parse_page_size("50").unwrap(), 50);
        assert!(Settings::parse_page_size("0").is_err());
        assert!(Settings::parse_page_size("101").is_err());
        assert!(Settings::parse_page_size("many").is_err());
    }

    #[test]
    fn test_feature_flags_parse() {
        let flags = FeatureFlags::parse_list("versioned_export, NOPE ,");
        assert!(flags.is_enabled(FeatureFlag::VersionedExport));
        assert!(!flags.is_enabled(FeatureFlag::Thumbnails));
        assert!(!FeatureFlags::default().is_enabled(FeatureFlag::VersionedExport));
    }
}
