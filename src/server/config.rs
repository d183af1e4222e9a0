//! HTTP server configuration

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;

use crate::config::Config;

const DEFAULT_PORT: u16 = 8080;

fn default_bind_address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
}

/// Configuration for the schema server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Enable CORS for API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,

    /// Keys refreshed from the content source before serving
    pub warm_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            enable_cors: true,
            enable_request_logging: true,
            warm_keys: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Server settings from the `[server]` section
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::builder()
            .bind_address_str(&config.server.bind_address)?
            .enable_cors(config.server.enable_cors)
            .enable_request_logging(config.server.enable_request_logging)
            .build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self.warm_keys.iter().find(|k| k.parse::<crate::models::EntityKey>().is_err()) {
            return Err(ConfigError::InvalidValue {
                field: "warm_keys".to_string(),
                reason: format!("Invalid entity key: {bad}"),
            });
        }

        Ok(())
    }
}

/// Builder for ServerConfig
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    bind_address: Option<SocketAddr>,
    enable_cors: Option<bool>,
    enable_request_logging: Option<bool>,
    warm_keys: Vec<String>,
}

impl ServerConfigBuilder {
    /// Set bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Set bind address from string
    pub fn bind_address_str(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.bind_address = Some(addr.parse().map_err(|_| ConfigError::InvalidValue {
            field: "bind_address".to_string(),
            reason: format!("Invalid address: {addr}"),
        })?);
        Ok(self)
    }

    /// Enable/disable CORS
    pub fn enable_cors(mut self, enable: bool) -> Self {
        self.enable_cors = Some(enable);
        self
    }

    /// Enable/disable request logging
    pub fn enable_request_logging(mut self, enable: bool) -> Self {
        self.enable_request_logging = Some(enable);
        self
    }

    /// Add an entity key (`type/id`) to refresh at startup
    pub fn warm_key(mut self, key: impl Into<String>) -> Self {
        self.warm_keys.push(key.into());
        self
    }

    /// Build the config
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let config = ServerConfig {
            bind_address: self.bind_address.unwrap_or_else(default_bind_address),
            enable_cors: self.enable_cors.unwrap_or(true),
            enable_request_logging: self.enable_request_logging.unwrap_or(true),
            warm_keys: self.warm_keys,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address.port(), 8080);
        assert!(config.enable_cors);
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::builder()
            .bind_address_str("127.0.0.1:9000")
            .unwrap()
            .enable_cors(false)
            .warm_key("course/course-1")
            .build()
            .unwrap();

        assert_eq!(config.bind_address.port(), 9000);
        assert!(!config.enable_cors);
        assert_eq!(config.warm_keys, vec!["course/course-1"]);
    }

    #[test]
    fn test_config_validation_fails() {
        assert!(ServerConfig::builder().bind_address_str("nope").is_err());
        assert!(ServerConfig::builder().warm_key("recipe/1").build().is_err());
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.server.bind_address = "127.0.0.1:7070".to_string();
        config.server.enable_request_logging = false;

        let server = ServerConfig::from_config(&config).unwrap();
        assert_eq!(server.bind_address.port(), 7070);
        assert!(!server.enable_request_logging);
    }
}
