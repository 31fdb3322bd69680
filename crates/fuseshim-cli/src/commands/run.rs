//! Locating and loading the mount configuration.

use std::path::PathBuf;

use fuseshim_config::MountConfig;

/// Config file lookup order: `--config`, `FUSESHIM_CONFIG`, `./fuseshim.yaml`.
pub fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    if let Ok(path) = std::env::var("FUSESHIM_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from("fuseshim.yaml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    None
}

pub fn load(explicit: Option<PathBuf>) -> Result<MountConfig, Box<dyn std::error::Error>> {
    let path = find_config(explicit)
        .ok_or("No configuration file found. Use --config, set FUSESHIM_CONFIG, or create fuseshim.yaml")?;
    Ok(MountConfig::from_file(&path)?)
}
