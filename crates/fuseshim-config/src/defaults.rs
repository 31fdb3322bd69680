use std::path::Path;

use crate::types::{FilesystemConfig, MountConfig};

impl MountConfig {
    /// Apply default inference rules to the configuration.
    /// This mutates the config in place.
    pub fn apply_defaults(&mut self) {
        // 1. Memory filesystem when none is given
        if self.filesystem.is_none() {
            self.filesystem = Some(FilesystemConfig::Memory);
        }

        // 2. Foreground unless told otherwise
        if self.foreground.is_none() {
            self.foreground = Some(true);
        }

        // 3. Log level
        match &mut self.log.level {
            Some(level) => *level = level.to_ascii_lowercase(),
            None => self.log.level = Some("info".to_string()),
        }

        // 4. Name inferred from the mount point
        if self.name.is_none() {
            self.name = derive_name(&self.mount_point);
        }
    }

    /// Returns a new config with all defaults applied.
    pub fn effective(&self) -> MountConfig {
        let mut config = self.clone();
        config.apply_defaults();
        config
    }
}

/// `/mnt/demo/` -> "demo"
fn derive_name(mount_point: &str) -> Option<String> {
    Path::new(mount_point.trim_end_matches('/'))
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}
