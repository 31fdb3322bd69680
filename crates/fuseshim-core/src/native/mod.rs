//! Mounting through libfuse 3.
//!
//! libfuse is loaded at runtime, so nothing here needs it at build time and
//! a missing library surfaces as [`MountError::Library`] on first mount.

pub mod abi;
mod library;
mod trampolines;

use std::ffi::{CString, OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use libc::{c_char, c_int, c_void};
use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::error::MountError;
use crate::operations::FuseOperations;
use crate::platform;
use crate::result::PosixResult;

use self::abi::fuse_operations;
use self::library::LibFuse;

const DEFAULT_PROGRAM_NAME: &str = "fuseshim";

/// Owned argv: a program name, then the caller's arguments, then null.
struct Argv {
    owned: Vec<CString>,
    pointers: Vec<*mut c_char>,
}

impl Argv {
    fn new<S: AsRef<OsStr>>(args: &[S]) -> Result<Self, MountError> {
        let program = std::env::args_os()
            .next()
            .unwrap_or_else(|| OsString::from(DEFAULT_PROGRAM_NAME));
        let owned = std::iter::once(program.as_os_str())
            .chain(args.iter().map(|arg| arg.as_ref()))
            .map(|arg| {
                CString::new(arg.as_bytes()).map_err(|_| {
                    MountError::InvalidArgument(format!(
                        "{} contains a NUL byte",
                        arg.to_string_lossy()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let pointers = owned
            .iter()
            .map(|arg| arg.as_ptr().cast_mut())
            .chain(std::iter::once(ptr::null_mut()))
            .collect();
        Ok(Argv { owned, pointers })
    }

    fn argc(&self) -> Result<c_int, MountError> {
        c_int::try_from(self.owned.len())
            .map_err(|_| MountError::InvalidArgument("too many arguments".into()))
    }
}

impl fmt::Display for Argv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.owned.iter().skip(1).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&arg.to_string_lossy())?;
        }
        Ok(())
    }
}

fn check(status: c_int) -> Result<(), MountError> {
    if status == 0 {
        Ok(())
    } else {
        Err(MountError::Native(PosixResult::from_native(status)))
    }
}

/// Mounts `fs` with the given arguments (mount point and libfuse options)
/// and blocks until it is unmounted. The filesystem is disposed before
/// returning.
pub fn mount<F, S>(fs: F, args: &[S]) -> Result<(), MountError>
where
    F: FuseOperations,
    S: AsRef<OsStr>,
{
    let platform = *platform::init()?;
    let dispatcher = Arc::new(Dispatcher::new(fs, platform));
    let result = run(&dispatcher, args);
    dispatcher.dispose();
    result
}

/// Runs the libfuse main loop for an existing dispatcher.
pub(crate) fn run<F, S>(dispatcher: &Arc<Dispatcher<F>>, args: &[S]) -> Result<(), MountError>
where
    F: FuseOperations,
    S: AsRef<OsStr>,
{
    let lib = LibFuse::load()?;
    let mut argv = Argv::new(args)?;
    let argc = argv.argc()?;
    let ops = trampolines::operations::<F>();
    info!("starting libfuse: {}", argv);
    // The Arc outlives the call: `dispatcher` is borrowed for its duration.
    let data = Arc::as_ptr(dispatcher).cast_mut().cast::<c_void>();
    let status = unsafe { lib.main(argc, argv.pointers.as_mut_ptr(), &ops, data) };
    info!("libfuse returned {}", status);
    check(status)
}

/// Runs libfuse with an empty operations table. Only useful for `--help`
/// and `--version`.
pub fn call_main<S: AsRef<OsStr>>(args: &[S]) -> Result<(), MountError> {
    let lib = LibFuse::load()?;
    let mut argv = Argv::new(args)?;
    let argc = argv.argc()?;
    let ops = fuse_operations::default();
    let status = unsafe { lib.main(argc, argv.pointers.as_mut_ptr(), &ops, ptr::null_mut()) };
    check(status)
}

/// Unmounts a FUSE mount point. `lazy` detaches it even while busy.
#[cfg(target_os = "linux")]
pub fn unmount(mount_point: &Path, lazy: bool) -> Result<(), MountError> {
    use std::process::Command;

    for helper in ["fusermount3", "fusermount"] {
        let mut cmd = Command::new(helper);
        cmd.arg("-u");
        if lazy {
            cmd.arg("-z");
        }
        cmd.arg(mount_point);
        match cmd.output() {
            Ok(out) if out.status.success() => {
                info!("unmounted {} with {}", mount_point.display(), helper);
                return Ok(());
            }
            Ok(out) => warn!(
                "{} -u {} failed: {}",
                helper,
                mount_point.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            Err(e) => warn!("cannot run {}: {}", helper, e),
        }
    }

    // Root can skip the setuid helper.
    let path = path_to_c(mount_point)?;
    let flags = if lazy { libc::MNT_DETACH } else { 0 };
    if unsafe { libc::umount2(path.as_ptr(), flags) } != 0 {
        return Err(MountError::Unmount {
            path: mount_point.display().to_string(),
            reason: std::io::Error::last_os_error().to_string(),
        });
    }
    Ok(())
}

/// Unmounts a FUSE mount point. `lazy` forces it even while busy.
#[cfg(target_os = "freebsd")]
pub fn unmount(mount_point: &Path, lazy: bool) -> Result<(), MountError> {
    let path = path_to_c(mount_point)?;
    let flags = if lazy { libc::MNT_FORCE } else { 0 };
    if unsafe { libc::unmount(path.as_ptr(), flags) } != 0 {
        return Err(MountError::Unmount {
            path: mount_point.display().to_string(),
            reason: std::io::Error::last_os_error().to_string(),
        });
    }
    info!("unmounted {}", mount_point.display());
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
pub fn unmount(mount_point: &Path, _lazy: bool) -> Result<(), MountError> {
    Err(MountError::Unmount {
        path: mount_point.display().to_string(),
        reason: "unsupported operating system".into(),
    })
}

#[cfg(any(target_os = "linux", target_os = "freebsd"))]
fn path_to_c(path: &Path) -> Result<CString, MountError> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| MountError::InvalidArgument(format!("{} contains a NUL byte", path.display())))
}
