//! POSIX result codes.
//!
//! [`PosixResult`] wraps a raw errno value. Codes 1 to 34 (except `EAGAIN`
//! and `EDEADLK`) agree between Linux and FreeBSD; everything past that is
//! platform-specific, so both tables are kept here and the one matching the
//! build target backs the associated constants on [`PosixResult`].

use std::ffi::CStr;
use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

macro_rules! errno_table {
    ($($name:ident = $value:expr),* $(,)?) => {
        $(pub const $name: i32 = $value;)*

        /// Every code in this table by symbolic name, in numeric order.
        pub const TABLE: &[(&str, i32)] = &[$((stringify!($name), $value)),*];
    };
}

/// Linux (glibc and musl, every architecture we support) errno numbering.
pub mod linux {
    errno_table! {
        EPERM = 1, ENOENT = 2, ESRCH = 3, EINTR = 4, EIO = 5, ENXIO = 6,
        E2BIG = 7, ENOEXEC = 8, EBADF = 9, ECHILD = 10, EAGAIN = 11,
        ENOMEM = 12, EACCES = 13, EFAULT = 14, ENOTBLK = 15, EBUSY = 16,
        EEXIST = 17, EXDEV = 18, ENODEV = 19, ENOTDIR = 20, EISDIR = 21,
        EINVAL = 22, ENFILE = 23, EMFILE = 24, ENOTTY = 25, ETXTBSY = 26,
        EFBIG = 27, ENOSPC = 28, ESPIPE = 29, EROFS = 30, EMLINK = 31,
        EPIPE = 32, EDOM = 33, ERANGE = 34, EDEADLK = 35, ENAMETOOLONG = 36,
        ENOLCK = 37, ENOSYS = 38, ENOTEMPTY = 39, ELOOP = 40, ENOMSG = 42,
        EIDRM = 43, ENODATA = 61, ETIME = 62, EOVERFLOW = 75, EILSEQ = 84,
        ENOTSOCK = 88, EOPNOTSUPP = 95, ENOTSUP = 95, EADDRINUSE = 98,
        ENETDOWN = 100, ECONNRESET = 104, ENOBUFS = 105, ETIMEDOUT = 110,
        ECONNREFUSED = 111, EALREADY = 114, EINPROGRESS = 115, ESTALE = 116,
        EDQUOT = 122, ECANCELED = 125,
    }
}

/// FreeBSD errno numbering.
pub mod freebsd {
    errno_table! {
        EPERM = 1, ENOENT = 2, ESRCH = 3, EINTR = 4, EIO = 5, ENXIO = 6,
        E2BIG = 7, ENOEXEC = 8, EBADF = 9, ECHILD = 10, EDEADLK = 11,
        ENOMEM = 12, EACCES = 13, EFAULT = 14, ENOTBLK = 15, EBUSY = 16,
        EEXIST = 17, EXDEV = 18, ENODEV = 19, ENOTDIR = 20, EISDIR = 21,
        EINVAL = 22, ENFILE = 23, EMFILE = 24, ENOTTY = 25, ETXTBSY = 26,
        EFBIG = 27, ENOSPC = 28, ESPIPE = 29, EROFS = 30, EMLINK = 31,
        EPIPE = 32, EDOM = 33, ERANGE = 34, EAGAIN = 35, EINPROGRESS = 36,
        EALREADY = 37, ENOTSOCK = 38, EOPNOTSUPP = 45, ENOTSUP = 45,
        EADDRINUSE = 48, ENETDOWN = 50, ECONNRESET = 54, ENOBUFS = 55,
        ETIMEDOUT = 60, ECONNREFUSED = 61, ELOOP = 62, ENAMETOOLONG = 63,
        ENOTEMPTY = 66, EDQUOT = 69, ESTALE = 70, ENOLCK = 77, ENOSYS = 78,
        EIDRM = 82, ENOMSG = 83, EOVERFLOW = 84, ECANCELED = 85, EILSEQ = 86,
        ENOATTR = 87,
    }
}

#[cfg(target_os = "freebsd")]
pub use freebsd as native;
#[cfg(not(target_os = "freebsd"))]
pub use linux as native;

/// A POSIX errno value. Zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PosixResult(i32);

macro_rules! native_aliases {
    ($($name:ident),* $(,)?) => {
        impl PosixResult {
            $(pub const $name: PosixResult = PosixResult(native::$name);)*
        }
    };
}

native_aliases! {
    EPERM, ENOENT, ESRCH, EINTR, EIO, ENXIO, E2BIG, EBADF, EAGAIN, ENOMEM,
    EACCES, EFAULT, EBUSY, EEXIST, EXDEV, ENODEV, ENOTDIR, EISDIR, EINVAL,
    ENFILE, EMFILE, ENOTTY, ETXTBSY, EFBIG, ENOSPC, ESPIPE, EROFS, EMLINK,
    EPIPE, ERANGE, EDEADLK, ENAMETOOLONG, ENOLCK, ENOSYS, ENOTEMPTY, ELOOP,
    EOVERFLOW, EOPNOTSUPP, ENOTSUP, ETIMEDOUT, ESTALE, EDQUOT, ECANCELED,
}

impl PosixResult {
    pub const SUCCESS: PosixResult = PosixResult(0);

    pub const fn new(value: i32) -> Self {
        PosixResult(value)
    }

    /// Interprets a native return value, where errors may come back negated.
    pub const fn from_native(status: i32) -> Self {
        PosixResult(status.wrapping_abs())
    }

    pub const fn value(self) -> i32 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// The value handed back to libfuse: `0` or `-errno`.
    pub const fn negated(self) -> i32 {
        -self.0
    }

    /// Symbolic name in the native table, if the code is known.
    pub fn name(self) -> Option<&'static str> {
        if self.0 == 0 {
            return Some("SUCCESS");
        }
        native::TABLE
            .iter()
            .find(|(_, value)| *value == self.0)
            .map(|(name, _)| *name)
    }

    /// The platform's description of this code.
    ///
    /// Looked up once per distinct value and cached for the life of the
    /// process.
    pub fn message(self) -> Arc<str> {
        let cache = message_cache();
        if let Some(text) = cache.get(&self.0) {
            return Arc::clone(text.value());
        }
        let text: Arc<str> = native_strerror(self.0).into();
        Arc::clone(cache.entry(self.0).or_insert(text).value())
    }
}

impl Default for PosixResult {
    fn default() -> Self {
        PosixResult::SUCCESS
    }
}

impl fmt::Display for PosixResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.0)
    }
}

impl std::error::Error for PosixResult {}

impl From<PosixResult> for i32 {
    fn from(result: PosixResult) -> i32 {
        result.0
    }
}

fn message_cache() -> &'static DashMap<i32, Arc<str>> {
    static MESSAGES: OnceLock<DashMap<i32, Arc<str>>> = OnceLock::new();
    MESSAGES.get_or_init(DashMap::new)
}

fn native_strerror(code: i32) -> String {
    let mut buf = [0 as libc::c_char; 256];
    // SAFETY: the buffer is writable for its full length and strerror_r
    // always NUL-terminates on success.
    let rc = unsafe { libc::strerror_r(code, buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return format!("Unknown error {}", code);
    }
    // SAFETY: see above.
    unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    // ====== Table Tests ======

    #[test]
    fn test_common_codes_agree() {
        for (name, value) in linux::TABLE.iter().filter(|(_, v)| *v <= 34) {
            if matches!(*name, "EAGAIN" | "EDEADLK") {
                continue;
            }
            let bsd = freebsd::TABLE.iter().find(|(n, _)| n == name);
            assert_eq!(bsd.map(|(_, v)| *v), Some(*value), "{} differs", name);
        }
    }

    #[test]
    fn test_platform_specific_codes() {
        assert_eq!(linux::ENAMETOOLONG, 36);
        assert_eq!(linux::ENOSYS, 38);
        assert_eq!(linux::ENOTSUP, 95);
        assert_eq!(freebsd::ENAMETOOLONG, 63);
        assert_eq!(freebsd::ENOSYS, 78);
        assert_eq!(freebsd::ENOTSUP, 45);
        assert_eq!(linux::EAGAIN, 11);
        assert_eq!(freebsd::EDEADLK, 11);
    }

    #[test]
    fn test_table_is_sorted_without_conflicting_names() {
        for table in [linux::TABLE, freebsd::TABLE] {
            let mut names = HashSet::new();
            for pair in table.windows(2) {
                assert!(pair[0].1 <= pair[1].1, "{:?} out of order", pair);
            }
            for (name, _) in table {
                assert!(names.insert(*name), "duplicate {}", name);
            }
        }
    }

    #[test]
    fn test_native_table_matches_libc() {
        assert_eq!(PosixResult::ENOENT.value(), libc::ENOENT);
        assert_eq!(PosixResult::ENOSYS.value(), libc::ENOSYS);
        assert_eq!(PosixResult::ENAMETOOLONG.value(), libc::ENAMETOOLONG);
        assert_eq!(PosixResult::ENOTEMPTY.value(), libc::ENOTEMPTY);
        assert_eq!(PosixResult::EOVERFLOW.value(), libc::EOVERFLOW);
        assert_eq!(PosixResult::EOPNOTSUPP.value(), libc::EOPNOTSUPP);
        assert_eq!(PosixResult::EAGAIN.value(), libc::EAGAIN);
    }

    // ====== PosixResult Tests ======

    #[test]
    fn test_success() {
        assert!(PosixResult::SUCCESS.is_success());
        assert!(!PosixResult::EIO.is_success());
        assert_eq!(PosixResult::default(), PosixResult::SUCCESS);
        assert_eq!(PosixResult::SUCCESS.negated(), 0);
    }

    #[test]
    fn test_negated_and_from_native() {
        assert_eq!(PosixResult::ENOENT.negated(), -2);
        assert_eq!(PosixResult::from_native(-2), PosixResult::ENOENT);
        assert_eq!(PosixResult::from_native(2), PosixResult::ENOENT);
    }

    #[test]
    fn test_name_lookup() {
        assert_eq!(PosixResult::ENOENT.name(), Some("ENOENT"));
        assert_eq!(PosixResult::SUCCESS.name(), Some("SUCCESS"));
        assert_eq!(PosixResult::new(9999).name(), None);
    }

    #[test]
    fn test_display_includes_value() {
        let text = PosixResult::ENOENT.to_string();
        assert!(text.ends_with(&format!("({})", libc::ENOENT)), "{}", text);
        assert!(text.len() > 4);
    }

    #[test]
    fn test_message_is_memoized() {
        let first = PosixResult::EACCES.message();
        let second = PosixResult::EACCES.message();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_message_cache_is_thread_safe() {
        let handles: Vec<_> = (0..8)
            .map(|i| std::thread::spawn(move || PosixResult::new(1 + i % 4).message()))
            .collect();
        for handle in handles {
            assert!(!handle.join().unwrap().is_empty());
        }
    }
}
