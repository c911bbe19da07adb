//! Configuration module for bakong-server.
//!
//! Handles loading configuration from the TOML file, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::FileConfig;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file and apply CLI overrides.
    pub fn load(&self) -> Result<FileConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            config.server.listen = listen;
        }

        Ok(config)
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
