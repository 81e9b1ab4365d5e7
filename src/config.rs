//! Configuration management for advisor-chat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for advisor-chat
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend endpoints
    #[serde(default)]
    pub server: ServerConfig,

    /// Realtime channel behavior
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where the session credential is persisted
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Backend server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the REST API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Realtime endpoint; derived from `api_url` when absent
    #[serde(default)]
    pub socket_url: Option<String>,

    /// Per-request timeout for REST calls (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_api_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            socket_url: None,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    /// Realtime endpoint URL, either configured or derived from the API URL
    /// by swapping `http` for `ws` (and `https` for `wss`).
    pub fn resolved_socket_url(&self) -> String {
        if let Some(url) = &self.socket_url {
            return url.clone();
        }
        if let Some(rest) = self.api_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.api_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.api_url.clone()
        }
    }

    /// REST request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Realtime channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Use the live connection at all; `false` forces REST-only operation
    #[serde(default = "default_realtime_enabled")]
    pub enabled: bool,

    /// How long to wait for the server to acknowledge an emitted event (seconds)
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_seconds: u64,
}

fn default_realtime_enabled() -> bool {
    true
}

fn default_ack_timeout() -> u64 {
    10
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: default_realtime_enabled(),
            ack_timeout_seconds: default_ack_timeout(),
        }
    }
}

impl RealtimeConfig {
    /// Acknowledgement timeout as a [`Duration`]
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON-formatted logs
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

/// Credential persistence backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialBackend {
    /// OS keyring (Keychain, Secret Service, Credential Manager)
    #[default]
    Keyring,
    /// Process memory only; the credential is lost on exit
    Memory,
}

/// Credential persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Backend used to persist the session credential
    #[serde(default)]
    pub backend: CredentialBackend,

    /// Keyring service name
    #[serde(default = "default_credential_service")]
    pub service: String,
}

fn default_credential_service() -> String {
    "advisor-chat".to_string()
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            backend: CredentialBackend::default(),
            service: default_credential_service(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(api_url) = std::env::var("ADVISOR_CHAT_API_URL") {
            tracing::debug!(api_url = %api_url, "Env override: ADVISOR_CHAT_API_URL");
            self.server.api_url = api_url;
        }

        if let Ok(socket_url) = std::env::var("ADVISOR_CHAT_SOCKET_URL") {
            tracing::debug!(socket_url = %socket_url, "Env override: ADVISOR_CHAT_SOCKET_URL");
            self.server.socket_url = Some(socket_url);
        }

        if let Ok(timeout) = std::env::var("ADVISOR_CHAT_ACK_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.realtime.ack_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid ADVISOR_CHAT_ACK_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(enabled) = std::env::var("ADVISOR_CHAT_REALTIME") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.realtime.enabled = true,
                "0" | "false" | "no" | "off" => self.realtime.enabled = false,
                _ => tracing::warn!("Invalid ADVISOR_CHAT_REALTIME: {}", enabled),
            }
        }

        if let Ok(level) = std::env::var("ADVISOR_CHAT_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(api_url) = &cli.api_url {
            self.server.api_url = api_url.clone();
        }
        if cli.no_realtime {
            self.realtime.enabled = false;
        }
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        let api = url::Url::parse(&self.server.api_url).map_err(|e| {
            ChatError::Config(format!("Invalid api_url '{}': {}", self.server.api_url, e))
        })?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(ChatError::Config(format!(
                "api_url must use http or https, got '{}'",
                api.scheme()
            ))
            .into());
        }

        let socket_url = self.server.resolved_socket_url();
        let socket = url::Url::parse(&socket_url)
            .map_err(|e| ChatError::Config(format!("Invalid socket_url '{}': {}", socket_url, e)))?;
        if !matches!(socket.scheme(), "ws" | "wss") {
            return Err(ChatError::Config(format!(
                "socket_url must use ws or wss, got '{}'",
                socket.scheme()
            ))
            .into());
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(
                ChatError::Config("request_timeout_seconds must be greater than 0".to_string())
                    .into(),
            );
        }
        if self.server.request_timeout_seconds > 300 {
            return Err(ChatError::Config(
                "request_timeout_seconds must be at most 300".to_string(),
            )
            .into());
        }

        if self.realtime.ack_timeout_seconds == 0 {
            return Err(
                ChatError::Config("ack_timeout_seconds must be greater than 0".to_string()).into(),
            );
        }
        if self.realtime.ack_timeout_seconds > 300 {
            return Err(
                ChatError::Config("ack_timeout_seconds must be at most 300".to_string()).into(),
            );
        }

        if self.credentials.service.trim().is_empty() {
            return Err(
                ChatError::Config("credentials.service cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cli() -> crate::cli::Cli {
        crate::cli::Cli::default()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.api_url, "http://localhost:3000");
        assert!(config.realtime.enabled);
        assert_eq!(config.realtime.ack_timeout_seconds, 10);
        assert_eq!(config.credentials.backend, CredentialBackend::Keyring);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_socket_url_derived_from_api_url() {
        let mut server = ServerConfig::default();
        assert_eq!(server.resolved_socket_url(), "ws://localhost:3000");

        server.api_url = "https://advising.example.edu".to_string();
        assert_eq!(server.resolved_socket_url(), "wss://advising.example.edu");

        server.socket_url = Some("wss://rt.example.edu/socket".to_string());
        assert_eq!(server.resolved_socket_url(), "wss://rt.example.edu/socket");
    }

    #[test]
    fn test_config_validation_bad_api_url() {
        let mut config = Config::default();
        config.server.api_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.server.api_url = "ftp://example.edu".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_socket_scheme() {
        let mut config = Config::default();
        config.server.socket_url = Some("http://localhost:3000".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_timeouts() {
        let mut config = Config::default();
        config.realtime.ack_timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.request_timeout_seconds = 301;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
server:
  api_url: https://advising.example.edu
  request_timeout_seconds: 15
realtime:
  enabled: false
  ack_timeout_seconds: 5
logging:
  level: debug
  json_format: true
credentials:
  backend: memory
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.api_url, "https://advising.example.edu");
        assert_eq!(config.server.request_timeout_seconds, 15);
        assert!(!config.realtime.enabled);
        assert_eq!(config.realtime.ack_timeout(), Duration::from_secs(5));
        assert!(config.logging.json_format);
        assert_eq!(config.credentials.backend, CredentialBackend::Memory);
        assert_eq!(config.credentials.service, "advisor-chat");
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = Config::load("nonexistent.yaml", &cli()).unwrap();
        assert_eq!(config.server.api_url, "http://localhost:3000");
    }

    #[test]
    #[serial]
    fn test_load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  api_url: http://10.0.0.5:3000\n").unwrap();

        let config = Config::load(path.to_str().unwrap(), &cli()).unwrap();
        assert_eq!(config.server.api_url, "http://10.0.0.5:3000");
        assert_eq!(config.server.resolved_socket_url(), "ws://10.0.0.5:3000");
    }

    #[test]
    #[serial]
    fn test_apply_env_vars() {
        std::env::set_var("ADVISOR_CHAT_API_URL", "http://env.example:8080");
        std::env::set_var("ADVISOR_CHAT_ACK_TIMEOUT_SECONDS", "3");
        std::env::set_var("ADVISOR_CHAT_REALTIME", "off");

        let config = Config::load("nonexistent.yaml", &cli()).unwrap();

        std::env::remove_var("ADVISOR_CHAT_API_URL");
        std::env::remove_var("ADVISOR_CHAT_ACK_TIMEOUT_SECONDS");
        std::env::remove_var("ADVISOR_CHAT_REALTIME");

        assert_eq!(config.server.api_url, "http://env.example:8080");
        assert_eq!(config.realtime.ack_timeout_seconds, 3);
        assert!(!config.realtime.enabled);
    }

    #[test]
    #[serial]
    fn test_invalid_env_timeout_is_ignored() {
        std::env::set_var("ADVISOR_CHAT_ACK_TIMEOUT_SECONDS", "soon");
        let config = Config::load("nonexistent.yaml", &cli()).unwrap();
        std::env::remove_var("ADVISOR_CHAT_ACK_TIMEOUT_SECONDS");

        assert_eq!(config.realtime.ack_timeout_seconds, 10);
    }

    #[test]
    #[serial]
    fn test_cli_overrides_win() {
        let mut cli = cli();
        cli.api_url = Some("http://cli.example:9000".to_string());
        cli.no_realtime = true;
        cli.verbose = true;

        let config = Config::load("nonexistent.yaml", &cli).unwrap();
        assert_eq!(config.server.api_url, "http://cli.example:9000");
        assert!(!config.realtime.enabled);
        assert_eq!(config.logging.level, "debug");
    }
}
