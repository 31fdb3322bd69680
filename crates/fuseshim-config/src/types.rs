use serde::{Deserialize, Serialize};

/// Which filesystem to mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilesystemConfig {
    /// Writable in-memory tree
    #[default]
    Memory,
    /// Passthrough to a host directory
    Mirror(MirrorConfig),
}

/// Mirror filesystem settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MirrorConfig {
    #[serde(default)]
    pub base_path: String,
}

/// Log verbosity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LogConfig {
    /// One of trace, debug, info, warn, error.
    #[serde(default)]
    pub level: Option<String>,
}

/// Levels accepted in `log.level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Top-level mount configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MountConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub filesystem: Option<FilesystemConfig>,
    #[serde(default)]
    pub mount_point: String,
    #[serde(default)]
    pub read_only: bool,
    /// Keep libfuse in the foreground (`-f`). Defaults to true.
    #[serde(default)]
    pub foreground: Option<bool>,
    /// Extra arguments passed to libfuse unchanged.
    #[serde(default)]
    pub fuse_options: Vec<String>,
    #[serde(default)]
    pub log: LogConfig,
}

impl MountConfig {
    /// libfuse arguments: `-f` when in the foreground, then the extra
    /// options, then the mount point last.
    pub fn fuse_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.fuse_options.len() + 2);
        if self.foreground.unwrap_or(true) {
            args.push("-f".to_string());
        }
        args.extend(self.fuse_options.iter().cloned());
        args.push(self.mount_point.clone());
        args
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or("info")
    }
}
