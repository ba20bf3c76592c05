//! Configuration management for the sample client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// OAuth client id registered for the sample.
pub const DEFAULT_CLIENT_ID: &str = "12cc4070a481bc73";

/// Redirect URI registered for the sample client id.
pub const DEFAULT_REDIRECT_URI: &str = "fxaclient://android.redirect";

/// Content server used for the standard OAuth flow.
pub const DEFAULT_CONTENT_URL: &str = "https://latest.dev.lcip.org";

/// Content server used when entering through a pairing invitation.
pub const DEFAULT_PAIRING_CONTENT_URL: &str = "https://pairsona.dev.lcip.org";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default timeout applied to every identity-service request.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Content server base URL for the standard flow.
    #[serde(default = "default_content_url")]
    pub content_url: String,
    /// Content server base URL for the pairing flow.
    #[serde(default = "default_pairing_content_url")]
    pub pairing_content_url: String,
    /// OAuth client id.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// OAuth redirect URI.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Request timeout for identity-service calls, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_content_url() -> String {
    DEFAULT_CONTENT_URL.to_string()
}

fn default_pairing_content_url() -> String {
    DEFAULT_PAIRING_CONTENT_URL.to_string()
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            content_url: default_content_url(),
            pairing_content_url: default_pairing_content_url(),
            client_id: default_client_id(),
            redirect_uri: default_redirect_uri(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from `FXA_SAMPLE_*` environment variables.
    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = non_empty("FXA_SAMPLE_LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = non_empty("FXA_SAMPLE_CONTENT_URL") {
            self.content_url = value;
        }
        if let Some(value) = non_empty("FXA_SAMPLE_PAIRING_URL") {
            self.pairing_content_url = value;
        }
        if let Some(value) = non_empty("FXA_SAMPLE_CLIENT_ID") {
            self.client_id = value;
        }
        if let Some(value) = non_empty("FXA_SAMPLE_REDIRECT_URI") {
            self.redirect_uri = value;
        }
        if let Some(secs) = non_empty("FXA_SAMPLE_HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.http_timeout_secs = secs;
        }
    }

    /// Check that every URL parses and the client id is set.
    pub fn validate(&self) -> CoreResult<()> {
        self.content_url()?;
        self.pairing_content_url()?;
        self.redirect_uri()?;
        if self.client_id.trim().is_empty() {
            return Err(CoreError::Config("client_id must not be empty".to_string()));
        }
        Ok(())
    }

    /// Standard-flow content server as a parsed URL.
    pub fn content_url(&self) -> CoreResult<Url> {
        Url::parse(&self.content_url).map_err(CoreError::from)
    }

    /// Pairing-flow content server as a parsed URL.
    pub fn pairing_content_url(&self) -> CoreResult<Url> {
        Url::parse(&self.pairing_content_url).map_err(CoreError::from)
    }

    /// Redirect URI as a parsed URL.
    pub fn redirect_uri(&self) -> CoreResult<Url> {
        Url::parse(&self.redirect_uri).map_err(CoreError::from)
    }

    /// Request timeout for identity-service calls.
    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.content_url, DEFAULT_CONTENT_URL);
        assert_eq!(config.pairing_content_url, DEFAULT_PAIRING_CONTENT_URL);
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.redirect_uri, DEFAULT_REDIRECT_URI);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_from_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "log_level": "debug" }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.content_url = "https://accounts.example.com".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.content_url, "https://accounts.example.com");
    }

    #[test]
    fn test_overrides_apply_non_empty_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FXA_SAMPLE_LOG_LEVEL", "trace"),
            ("FXA_SAMPLE_CONTENT_URL", "https://stage.example.com"),
            ("FXA_SAMPLE_CLIENT_ID", "   "),
            ("FXA_SAMPLE_HTTP_TIMEOUT_SECS", "5"),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.content_url, "https://stage.example.com");
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.http_timeout_secs, 5);
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.content_url = "not a valid url".to_string();

        assert!(config.content_url().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_empty_client_id_rejected() {
        let mut config = Config::default();
        config.client_id = String::new();
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_redirect_uri_custom_scheme_parses() {
        let config = Config::default();
        let url = config.redirect_uri().unwrap();
        assert_eq!(url.scheme(), "fxaclient");
    }
}
