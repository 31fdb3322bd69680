//! Runtime binding to the libfuse 3 shared library.

use std::mem::size_of;
use std::ptr;
use std::sync::OnceLock;

use libc::{c_char, c_int, c_void, size_t};
use libloading::Library;
use tracing::{debug, info};

use super::abi::{fuse_context, fuse_operations};
use crate::error::MountError;

type FuseMainReal = unsafe extern "C" fn(
    c_int,
    *mut *mut c_char,
    *const fuse_operations,
    size_t,
    *mut c_void,
) -> c_int;

type FuseGetContext = unsafe extern "C" fn() -> *mut fuse_context;

/// Sonames tried in order.
const CANDIDATES: &[&str] = &["libfuse3.so.3", "libfuse3.so"];

static LIBFUSE: OnceLock<LibFuse> = OnceLock::new();

pub(crate) struct LibFuse {
    main_real: FuseMainReal,
    get_context: FuseGetContext,
    // Keeps the symbols above valid.
    _library: Library,
}

impl LibFuse {
    /// Loads the library on first use.
    pub(crate) fn load() -> Result<&'static LibFuse, MountError> {
        if let Some(lib) = LIBFUSE.get() {
            return Ok(lib);
        }
        let mut failures = Vec::new();
        for name in CANDIDATES {
            match unsafe { Self::open(name) } {
                Ok(lib) => {
                    info!("loaded {}", name);
                    return Ok(LIBFUSE.get_or_init(|| lib));
                }
                Err(e) => {
                    debug!("cannot load {}: {}", name, e);
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }
        Err(MountError::Library(failures.join("; ")))
    }

    /// The library, if [`LibFuse::load`] succeeded.
    pub(crate) fn get() -> Option<&'static LibFuse> {
        LIBFUSE.get()
    }

    unsafe fn open(name: &str) -> Result<LibFuse, libloading::Error> {
        let library = unsafe { Library::new(name) }?;
        let main_real = unsafe { *library.get::<FuseMainReal>(b"fuse_main_real\0")? };
        let get_context = unsafe { *library.get::<FuseGetContext>(b"fuse_get_context\0")? };
        Ok(LibFuse {
            main_real,
            get_context,
            _library: library,
        })
    }

    /// Runs `fuse_main_real`; blocks until the filesystem is unmounted.
    ///
    /// # Safety
    ///
    /// `argv` must hold `argc` valid C strings followed by a null pointer.
    /// `private_data` must stay valid until the call returns.
    pub(crate) unsafe fn main(
        &self,
        argc: c_int,
        argv: *mut *mut c_char,
        ops: &fuse_operations,
        private_data: *mut c_void,
    ) -> c_int {
        unsafe {
            (self.main_real)(
                argc,
                argv,
                ops,
                size_of::<fuse_operations>(),
                private_data,
            )
        }
    }

    /// `fuse_get_context()->private_data` of the calling worker thread.
    pub(crate) fn private_data(&self) -> *mut c_void {
        let context = unsafe { (self.get_context)() };
        unsafe { context.as_ref() }.map_or(ptr::null_mut(), |c| c.private_data)
    }
}
