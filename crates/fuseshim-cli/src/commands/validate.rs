//! Validate command.

use std::path::PathBuf;

use fuseshim_config::{FilesystemConfig, MountConfig};

/// Print every problem in the configuration, failing if there is any.
pub fn run(config: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::run::load(config)?;
    report(&config)
}

fn report(config: &MountConfig) -> Result<(), Box<dyn std::error::Error>> {
    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("  - {}", error);
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    let effective = config.effective();
    let filesystem = match effective.filesystem.clone().unwrap_or_default() {
        FilesystemConfig::Memory => "memory".to_string(),
        FilesystemConfig::Mirror(mirror) => format!("mirror of {}", mirror.base_path),
    };
    println!("Configuration is valid");
    println!("  filesystem:  {}", filesystem);
    println!("  mount point: {}", effective.mount_point);
    println!("  read-only:   {}", effective.read_only);
    println!("  fuse args:   {}", effective.fuse_args().join(" "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_valid_config() {
        let config = MountConfig {
            mount_point: "/mnt/x".to_string(),
            ..Default::default()
        };
        assert!(report(&config).is_ok());
    }

    #[test]
    fn test_report_counts_errors() {
        let config = MountConfig {
            filesystem: Some(FilesystemConfig::Mirror(Default::default())),
            ..Default::default()
        };
        let err = report(&config).unwrap_err();
        assert_eq!(err.to_string(), "2 configuration error(s)");
    }
}
