//! Configuration management for the ILS gateway

use config::{Config, ConfigError, Environment, File};
use indexmap::IndexMap;
use serde::Deserialize;
use std::env;

use crate::namespace::SEPARATOR;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

/// Sources patrons may log in to
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoginConfig {
    #[serde(default)]
    pub drivers: Vec<String>,
    #[serde(default)]
    pub default_driver: Option<String>,
}

/// Backend registry of the router
#[derive(Debug, Deserialize, Clone)]
pub struct MultiBackendConfig {
    /// Source used for unscoped identifiers
    #[serde(default)]
    pub default_driver: Option<String>,
    /// Sub-directory of `config_dir` holding per-source driver configuration
    #[serde(default)]
    pub drivers_config_path: Option<String>,
    #[serde(default = "default_config_dir")]
    pub config_dir: String,
    /// Source token to driver type
    #[serde(default)]
    pub drivers: IndexMap<String, String>,
    #[serde(default)]
    pub login: LoginConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub multibackend: MultiBackendConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Layer on the environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add environment variables (with prefix ILS_GATEWAY_)
            .add_source(
                Environment::with_prefix("ILS_GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.multibackend.validate()?;
        Ok(config)
    }
}

impl MultiBackendConfig {
    /// Check the registry is usable before any request is served
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drivers.is_empty() {
            return Err(ConfigError::Message(
                "multibackend.drivers must name at least one source".to_string(),
            ));
        }
        if let Some(source) = self.drivers.keys().find(|s| s.contains(SEPARATOR)) {
            return Err(ConfigError::Message(format!(
                "Source '{}' must not contain '{}'",
                source, SEPARATOR
            )));
        }
        let referenced = self
            .default_driver
            .iter()
            .chain(self.login.default_driver.iter())
            .chain(self.login.drivers.iter());
        for source in referenced {
            if !self.drivers.contains_key(source) {
                return Err(ConfigError::Message(format!(
                    "Source '{}' is not configured in multibackend.drivers",
                    source
                )));
            }
        }
        Ok(())
    }

    /// Source used when a login username carries no prefix
    pub fn default_login_driver(&self) -> String {
        self.login
            .default_driver
            .clone()
            .or_else(|| self.login.drivers.first().cloned())
            .unwrap_or_default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn default_config_dir() -> String {
    "config".to_string()
}

impl Default for MultiBackendConfig {
    fn default() -> Self {
        Self {
            default_driver: None,
            drivers_config_path: None,
            config_dir: default_config_dir(),
            drivers: IndexMap::new(),
            login: LoginConfig::default(),
        }
    }
}
