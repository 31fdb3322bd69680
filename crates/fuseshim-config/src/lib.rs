mod defaults;
mod env;
pub mod types;
mod validation;

use std::path::Path;

pub use env::interpolate_env;
pub use types::*;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Missing environment variables: {0:?}")]
    MissingEnvVars(Vec<String>),

    #[error("Missing mount point")]
    MissingMountPoint,

    #[error("Invalid FUSE option '{0}': {1}")]
    InvalidFuseOption(String, String),

    #[error("Invalid log level '{0}'")]
    InvalidLogLevel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MountConfig {
    /// Parse a mount configuration from a YAML string.
    /// Environment variables in the format `${VAR_NAME}` will be interpolated.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = env::interpolate_env(yaml)?;
        let config: MountConfig = serde_yaml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Load a mount configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
