//! Unmount command.

use std::path::Path;

use tracing::info;

/// Release `mountpoint`, lazily if asked.
pub fn run(mountpoint: &Path, lazy: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mountpoint = mountpoint
        .canonicalize()
        .unwrap_or_else(|_| mountpoint.to_path_buf());

    fuseshim_core::unmount(&mountpoint, lazy)?;

    info!(mount_point = %mountpoint.display(), lazy, "unmounted");
    println!("Unmounted {}", mountpoint.display());
    Ok(())
}
