//! Mount commands. Every mount ends up as a [`MountConfig`] so the command
//! line and configuration files share one code path.

use std::path::PathBuf;

use fuseshim_backends::{MemoryFs, MirrorFs};
use fuseshim_config::{FilesystemConfig, MirrorConfig, MountConfig};
use fuseshim_core::{FuseOperations, MountError};
use tracing::info;

/// Arguments shared by `mem` and `mirror`.
pub struct MountArgs {
    /// Mount point path.
    pub mountpoint: PathBuf,
    /// Reject modifications.
    pub read_only: bool,
    /// Let libfuse daemonize.
    pub background: bool,
    /// Extra libfuse arguments.
    pub fuse_options: Vec<String>,
}

impl MountArgs {
    fn into_config(self, filesystem: FilesystemConfig) -> MountConfig {
        MountConfig {
            filesystem: Some(filesystem),
            mount_point: self.mountpoint.to_string_lossy().into_owned(),
            read_only: self.read_only,
            foreground: Some(!self.background),
            fuse_options: self.fuse_options,
            ..Default::default()
        }
    }
}

pub fn run_memory(args: MountArgs) -> Result<(), Box<dyn std::error::Error>> {
    run(args.into_config(FilesystemConfig::Memory))
}

pub fn run_mirror(base_path: PathBuf, args: MountArgs) -> Result<(), Box<dyn std::error::Error>> {
    let base_path = base_path.to_string_lossy().into_owned();
    run(args.into_config(FilesystemConfig::Mirror(MirrorConfig { base_path })))
}

/// Mount `config` and block until the filesystem is unmounted.
pub fn run(config: MountConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate_or_err()?;
    let config = config.effective();

    let mountpoint = PathBuf::from(&config.mount_point);
    if !mountpoint.exists() {
        std::fs::create_dir_all(&mountpoint)?;
    }

    let args = config.fuse_args();
    let name = config.name.as_deref().unwrap_or("fuseshim");
    match config.filesystem.unwrap_or_default() {
        FilesystemConfig::Memory => {
            info!(name, mount_point = %config.mount_point, read_only = config.read_only, "mounting memory filesystem");
            host(MemoryFs::new().with_read_only(config.read_only), &args)?;
        }
        FilesystemConfig::Mirror(mirror) => {
            info!(name, base_path = %mirror.base_path, mount_point = %config.mount_point, read_only = config.read_only, "mounting mirror filesystem");
            let fs = MirrorFs::new(&mirror.base_path)?.with_read_only(config.read_only);
            host(fs, &args)?;
        }
    }
    Ok(())
}

fn host<F: FuseOperations>(fs: F, args: &[String]) -> Result<(), MountError> {
    let result = fuseshim_core::mount(fs, args);
    match &result {
        Ok(()) => info!("filesystem unmounted"),
        Err(e) => tracing::error!("mount failed: {}", e),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_become_config() {
        let config = MountArgs {
            mountpoint: PathBuf::from("/mnt/x"),
            read_only: true,
            background: false,
            fuse_options: vec!["-o".to_string(), "ro".to_string()],
        }
        .into_config(FilesystemConfig::Memory);

        assert!(config.read_only);
        assert_eq!(config.fuse_args(), vec!["-f", "-o", "ro", "/mnt/x"]);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_background_drops_foreground_flag() {
        let config = MountArgs {
            mountpoint: PathBuf::from("/mnt/x"),
            read_only: false,
            background: true,
            fuse_options: Vec::new(),
        }
        .into_config(FilesystemConfig::Memory);
        assert_eq!(config.fuse_args(), vec!["/mnt/x"]);
    }

    #[test]
    fn test_mirror_of_missing_directory_fails_before_mounting() {
        let dir = tempfile::TempDir::new().unwrap();
        let args = MountArgs {
            mountpoint: dir.path().join("mnt"),
            read_only: false,
            background: false,
            fuse_options: Vec::new(),
        };
        let result = run_mirror(dir.path().join("missing"), args);
        let err = result.unwrap_err();
        assert!(err.downcast_ref::<fuseshim_backends::BackendError>().is_some());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = run(MountConfig::default());
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<fuseshim_config::ConfigError>(),
            Some(fuseshim_config::ConfigError::MissingMountPoint)
        ));
    }
}
