//! Application configuration loaded from TOML.
//!
//! Every field has a default, so an empty (or missing) file is a valid
//! configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::DEFAULT_MAX_FILE_SIZE;
use crate::model::DEFAULT_TEMPERATURE;
use crate::options::{TransportOptions, DEFAULT_BASE_URL};

/// Errors from loading configuration or installing the log subscriber.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Logging error: {0}")]
    Logging(String),
}

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "ollachat.toml";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.

When answering questions:
- Be clear and concise
- Provide working code examples when relevant
- Explain your reasoning

If files are provided below, you can reference and analyze them.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding `index.html` and the frontend assets.
    pub static_dir: PathBuf,
    /// Allow cross-origin requests from any origin.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            static_dir: PathBuf::from("static"),
            cors: true,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Model runtime endpoint and timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub pull_read_timeout_secs: u64,
    pub proxy: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
            read_timeout_secs: 300,
            pull_read_timeout_secs: 3600,
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Daily rolling log files are written here when set.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub default_temperature: f32,
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_temperature: DEFAULT_TEMPERATURE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// Project directory offered as chat context. Disabled when unset.
    pub project_root: Option<PathBuf>,
    pub max_file_size: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            project_root: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub logging: LoggingConfig,
    pub chat: ChatConfig,
    pub context: ContextConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`, or `ollachat.toml` when present, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    pub fn transport_options(&self) -> TransportOptions {
        let upstream = &self.upstream;
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));

        let mut options = TransportOptions::new(upstream.base_url.as_str());
        options.connect_timeout = secs(upstream.connect_timeout_secs);
        options.request_timeout = secs(upstream.request_timeout_secs);
        options.read_timeout = secs(upstream.read_timeout_secs);
        options.pull_read_timeout = secs(upstream.pull_read_timeout_secs);
        options.proxy = upstream.proxy.clone();
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.server.bind_addr(), "127.0.0.1:8000");
        assert_eq!(config.upstream.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_partial_override() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [upstream]
            base_url = "http://gpu-box:11434/"
            read_timeout_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");

        let options = config.transport_options();
        assert_eq!(options.base_url, "http://gpu-box:11434");
        assert_eq!(options.read_timeout, None);
        assert_eq!(options.pull_read_timeout, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_from_file_reports_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"not a number\"").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
        assert!(err.to_string().starts_with(&file.path().display().to_string()));
    }

    #[test]
    fn test_from_file_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.chat.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }
}
