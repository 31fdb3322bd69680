use crate::types::{FilesystemConfig, MountConfig, LOG_LEVELS};
use crate::ConfigError;

impl MountConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.mount_point.trim().is_empty() {
            errors.push(ConfigError::MissingMountPoint);
        } else if self.mount_point.contains('\0') {
            errors.push(ConfigError::InvalidFuseOption(
                self.mount_point.clone(),
                "mount point contains a NUL byte".to_string(),
            ));
        }

        if let Some(FilesystemConfig::Mirror(mirror)) = &self.filesystem {
            if mirror.base_path.trim().is_empty() {
                errors.push(ConfigError::InvalidConfig(
                    "Mirror filesystem requires a base_path".to_string(),
                ));
            }
        }

        for option in &self.fuse_options {
            if option.contains('\0') {
                errors.push(ConfigError::InvalidFuseOption(
                    option.clone(),
                    "contains a NUL byte".to_string(),
                ));
            }
        }

        if let Some(level) = &self.log.level {
            if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                errors.push(ConfigError::InvalidLogLevel(level.clone()));
            }
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
