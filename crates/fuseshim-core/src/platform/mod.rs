//! Native `stat`, `statvfs` and `timespec` layouts.
//!
//! Every supported (OS, architecture) pair has its own module with
//! `#[repr(C)]` mirrors of the C structs. All layouts are compiled on every
//! host, each with a `const` size assertion, so any of them can be exercised
//! from tests regardless of where they run. The layout for the running
//! process is chosen once by [`init`].
//!
//! | Platform | stat | statvfs | timespec |
//! |---|---|---|---|
//! | Linux x86-64 | 144 | 112 | 16 |
//! | Linux x86 / ARM32 | 96 | 96 | 8 |
//! | Linux ARM64 | 128 | 112 | 16 |
//! | FreeBSD x86-64 | 224 | 88 | 16 |

mod freebsd_x86_64;
mod linux_aarch64;
mod linux_ilp32;
mod linux_x86_64;

use std::fmt;
use std::mem::size_of;
use std::sync::OnceLock;

use tracing::info;

use crate::result::PosixResult;
use crate::stat::{FileStat, VfsStat};
use crate::time::TimeSpec;

/// Errors raised while selecting or verifying the native layout.
///
/// All of them are fatal: the process must not talk to libfuse with a layout
/// it cannot trust.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PlatformError {
    #[error("Unsupported platform: {os}/{arch}")]
    Unsupported { os: String, arch: String },

    #[error("{platform} {structure} is {actual} bytes, expected {expected}")]
    LayoutMismatch {
        platform: Platform,
        structure: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("errno {name} is {table} in the built-in table but {native} on this system")]
    ErrnoMismatch {
        name: &'static str,
        table: i32,
        native: i32,
    },
}

/// A value that does not fit the native field it is written to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum MarshalError {
    #[error("{field} value {value} does not fit the native layout")]
    Overflow { field: &'static str, value: i128 },

    #[error("{structure} needs {needed} bytes, buffer holds {actual}")]
    BufferTooSmall {
        structure: &'static str,
        needed: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    FreeBsd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Arm,
    Aarch64,
}

/// The concrete struct layout family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    LinuxX86_64,
    /// Linux x86 and 32-bit ARM, built with 64-bit file offsets.
    LinuxIlp32,
    LinuxAarch64,
    FreeBsdX86_64,
}

/// Documented native sizes: (stat, statvfs, timespec).
pub const fn documented_sizes(layout: Layout) -> (usize, usize, usize) {
    match layout {
        Layout::LinuxX86_64 => (144, 112, 16),
        Layout::LinuxIlp32 => (96, 96, 8),
        Layout::LinuxAarch64 => (128, 112, 16),
        Layout::FreeBsdX86_64 => (224, 88, 16),
    }
}

/// A supported (OS, architecture) pair and its layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    os: OsFamily,
    arch: Arch,
    layout: Layout,
}

impl Platform {
    pub const LINUX_X86_64: Platform = Platform {
        os: OsFamily::Linux,
        arch: Arch::X86_64,
        layout: Layout::LinuxX86_64,
    };
    pub const LINUX_X86: Platform = Platform {
        os: OsFamily::Linux,
        arch: Arch::X86,
        layout: Layout::LinuxIlp32,
    };
    pub const LINUX_ARM: Platform = Platform {
        os: OsFamily::Linux,
        arch: Arch::Arm,
        layout: Layout::LinuxIlp32,
    };
    pub const LINUX_AARCH64: Platform = Platform {
        os: OsFamily::Linux,
        arch: Arch::Aarch64,
        layout: Layout::LinuxAarch64,
    };
    pub const FREEBSD_X86_64: Platform = Platform {
        os: OsFamily::FreeBsd,
        arch: Arch::X86_64,
        layout: Layout::FreeBsdX86_64,
    };

    /// Every supported pair.
    pub const ALL: [Platform; 5] = [
        Self::LINUX_X86_64,
        Self::LINUX_X86,
        Self::LINUX_ARM,
        Self::LINUX_AARCH64,
        Self::FREEBSD_X86_64,
    ];

    pub fn new(os: OsFamily, arch: Arch) -> Option<Platform> {
        Self::ALL
            .into_iter()
            .find(|p| p.os == os && p.arch == arch)
    }

    /// Looks up the pair by the names used in `std::env::consts`.
    pub fn from_names(os: &str, arch: &str) -> Result<Platform, PlatformError> {
        let unsupported = || PlatformError::Unsupported {
            os: os.to_string(),
            arch: arch.to_string(),
        };
        let os_family = match os {
            "linux" => OsFamily::Linux,
            "freebsd" => OsFamily::FreeBsd,
            _ => return Err(unsupported()),
        };
        let cpu = match arch {
            "x86" => Arch::X86,
            "x86_64" => Arch::X86_64,
            "arm" => Arch::Arm,
            "aarch64" => Arch::Aarch64,
            _ => return Err(unsupported()),
        };
        Self::new(os_family, cpu).ok_or_else(unsupported)
    }

    /// The pair this binary was built for.
    pub fn detect() -> Result<Platform, PlatformError> {
        Self::from_names(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn os(&self) -> OsFamily {
        self.os
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn stat_size(&self) -> usize {
        match self.layout {
            Layout::LinuxX86_64 => size_of::<linux_x86_64::Stat>(),
            Layout::LinuxIlp32 => size_of::<linux_ilp32::Stat>(),
            Layout::LinuxAarch64 => size_of::<linux_aarch64::Stat>(),
            Layout::FreeBsdX86_64 => size_of::<freebsd_x86_64::Stat>(),
        }
    }

    pub fn statvfs_size(&self) -> usize {
        match self.layout {
            Layout::LinuxX86_64 => size_of::<linux_x86_64::StatVfs>(),
            Layout::LinuxIlp32 => size_of::<linux_ilp32::StatVfs>(),
            Layout::LinuxAarch64 => size_of::<linux_aarch64::StatVfs>(),
            Layout::FreeBsdX86_64 => size_of::<freebsd_x86_64::StatVfs>(),
        }
    }

    pub fn timespec_size(&self) -> usize {
        match self.layout {
            Layout::LinuxX86_64 => size_of::<linux_x86_64::Timespec>(),
            Layout::LinuxIlp32 => size_of::<linux_ilp32::Timespec>(),
            Layout::LinuxAarch64 => size_of::<linux_aarch64::Timespec>(),
            Layout::FreeBsdX86_64 => size_of::<freebsd_x86_64::Timespec>(),
        }
    }

    /// Checks the compiled layout sizes against the documented ones.
    pub fn verify(&self) -> Result<(), PlatformError> {
        let (stat, statvfs, timespec) = documented_sizes(self.layout);
        let checks = [
            ("stat", stat, self.stat_size()),
            ("statvfs", statvfs, self.statvfs_size()),
            ("timespec", timespec, self.timespec_size()),
        ];
        for (structure, expected, actual) in checks {
            if expected != actual {
                return Err(PlatformError::LayoutMismatch {
                    platform: *self,
                    structure,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Writes `stat` in the native layout to the start of `dst`.
    pub fn encode_stat(&self, stat: &FileStat, dst: &mut [u8]) -> Result<(), MarshalError> {
        check_len("stat", self.stat_size(), dst)?;
        match self.layout {
            Layout::LinuxX86_64 => write_struct(&linux_x86_64::Stat::from_portable(stat)?, dst),
            Layout::LinuxIlp32 => write_struct(&linux_ilp32::Stat::from_portable(stat)?, dst),
            Layout::LinuxAarch64 => write_struct(&linux_aarch64::Stat::from_portable(stat)?, dst),
            Layout::FreeBsdX86_64 => write_struct(&freebsd_x86_64::Stat::from_portable(stat)?, dst),
        }
        Ok(())
    }

    /// Writes `stat` in the native `statvfs` layout to the start of `dst`.
    pub fn encode_statvfs(&self, stat: &VfsStat, dst: &mut [u8]) -> Result<(), MarshalError> {
        check_len("statvfs", self.statvfs_size(), dst)?;
        match self.layout {
            Layout::LinuxX86_64 => write_struct(&linux_x86_64::StatVfs::from_portable(stat), dst),
            Layout::LinuxIlp32 => write_struct(&linux_ilp32::StatVfs::from_portable(stat)?, dst),
            Layout::LinuxAarch64 => write_struct(&linux_aarch64::StatVfs::from_portable(stat), dst),
            Layout::FreeBsdX86_64 => {
                write_struct(&freebsd_x86_64::StatVfs::from_portable(stat), dst)
            }
        }
        Ok(())
    }

    /// Writes one native `timespec`, mapping the portable sentinels to the
    /// platform's `UTIME_NOW`/`UTIME_OMIT`.
    pub fn encode_timespec(&self, time: TimeSpec, dst: &mut [u8]) -> Result<(), MarshalError> {
        check_len("timespec", self.timespec_size(), dst)?;
        match self.layout {
            Layout::LinuxX86_64 => write_struct(&linux_x86_64::Timespec::from_portable(time), dst),
            Layout::LinuxIlp32 => write_struct(&linux_ilp32::Timespec::from_portable(time)?, dst),
            Layout::LinuxAarch64 => {
                write_struct(&linux_aarch64::Timespec::from_portable(time), dst)
            }
            Layout::FreeBsdX86_64 => {
                write_struct(&freebsd_x86_64::Timespec::from_portable(time), dst)
            }
        }
        Ok(())
    }

    /// Reads one native `timespec` from the start of `src`.
    pub fn decode_timespec(&self, src: &[u8]) -> Result<TimeSpec, MarshalError> {
        check_len("timespec", self.timespec_size(), src)?;
        Ok(match self.layout {
            Layout::LinuxX86_64 => read_struct::<linux_x86_64::Timespec>(src).to_portable(),
            Layout::LinuxIlp32 => read_struct::<linux_ilp32::Timespec>(src).to_portable(),
            Layout::LinuxAarch64 => read_struct::<linux_aarch64::Timespec>(src).to_portable(),
            Layout::FreeBsdX86_64 => read_struct::<freebsd_x86_64::Timespec>(src).to_portable(),
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let os = match self.os {
            OsFamily::Linux => "linux",
            OsFamily::FreeBsd => "freebsd",
        };
        let arch = match self.arch {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Arm => "arm",
            Arch::Aarch64 => "aarch64",
        };
        write!(f, "{}-{}", os, arch)
    }
}

static CURRENT: OnceLock<Platform> = OnceLock::new();

/// Selects and verifies the layout of the running process.
///
/// Call once during startup, before anything is handed to libfuse. Later
/// calls return the already selected platform.
pub fn init() -> Result<&'static Platform, PlatformError> {
    if let Some(platform) = CURRENT.get() {
        return Ok(platform);
    }
    let platform = Platform::detect()?;
    platform.verify()?;
    verify_errno_table()?;
    info!("native layout: {} ({:?})", platform, platform.layout);
    Ok(CURRENT.get_or_init(|| platform))
}

/// The platform chosen by [`init`], if it has run.
pub fn current() -> Option<&'static Platform> {
    CURRENT.get()
}

fn verify_errno_table() -> Result<(), PlatformError> {
    let pairs = [
        ("ENOENT", PosixResult::ENOENT, libc::ENOENT),
        ("EAGAIN", PosixResult::EAGAIN, libc::EAGAIN),
        ("ENAMETOOLONG", PosixResult::ENAMETOOLONG, libc::ENAMETOOLONG),
        ("ENOSYS", PosixResult::ENOSYS, libc::ENOSYS),
        ("ENOTEMPTY", PosixResult::ENOTEMPTY, libc::ENOTEMPTY),
        ("EOVERFLOW", PosixResult::EOVERFLOW, libc::EOVERFLOW),
        ("EOPNOTSUPP", PosixResult::EOPNOTSUPP, libc::EOPNOTSUPP),
    ];
    for (name, table, native) in pairs {
        if table.value() != native {
            return Err(PlatformError::ErrnoMismatch {
                name,
                table: table.value(),
                native,
            });
        }
    }
    Ok(())
}

// ====== Field conversion helpers ======

/// Checked narrowing into a native field.
pub(crate) fn narrow<T, S>(field: &'static str, value: S) -> Result<T, MarshalError>
where
    S: Copy + Into<i128>,
    T: TryFrom<S>,
{
    T::try_from(value).map_err(|_| MarshalError::Overflow {
        field,
        value: value.into(),
    })
}

/// Timestamp for a stat field: `NOW` becomes the current time and `OMIT`,
/// which means nothing in a stat, becomes the epoch.
pub(crate) fn stat_time(time: TimeSpec) -> TimeSpec {
    if time.is_omit() {
        TimeSpec::EPOCH
    } else {
        time.resolve()
    }
}

/// Native nanosecond value for `time`, given the platform's sentinels.
pub(crate) fn native_nsec(time: TimeSpec, utime_now: i64, utime_omit: i64) -> i64 {
    if time.is_now() {
        utime_now
    } else if time.is_omit() {
        utime_omit
    } else {
        time.nsec
    }
}

/// Portable timestamp for a native pair, given the platform's sentinels.
pub(crate) fn portable_time(sec: i64, nsec: i64, utime_now: i64, utime_omit: i64) -> TimeSpec {
    if nsec == utime_now {
        TimeSpec::NOW
    } else if nsec == utime_omit {
        TimeSpec::OMIT
    } else {
        TimeSpec::new(sec, nsec)
    }
}

fn check_len(structure: &'static str, needed: usize, buf: &[u8]) -> Result<(), MarshalError> {
    if buf.len() < needed {
        return Err(MarshalError::BufferTooSmall {
            structure,
            needed,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Copies `value` byte for byte into `dst`.
///
/// The layout types carry explicit padding fields, so every byte copied is
/// initialized.
fn write_struct<T: Copy>(value: &T, dst: &mut [u8]) {
    debug_assert!(dst.len() >= size_of::<T>());
    // SAFETY: the caller checked that `dst` holds at least size_of::<T>()
    // bytes; write_unaligned has no alignment requirement.
    unsafe { std::ptr::write_unaligned(dst.as_mut_ptr().cast::<T>(), *value) }
}

pub(crate) fn read_struct<T: Copy>(src: &[u8]) -> T {
    assert!(src.len() >= size_of::<T>());
    // SAFETY: length checked above; the layout types are plain integers for
    // which every bit pattern is valid.
    unsafe { std::ptr::read_unaligned(src.as_ptr().cast::<T>()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::PosixFileMode;
    use proptest::prelude::*;

    pub(super) fn sample_stat() -> FileStat {
        FileStat {
            dev: 0x0803,
            ino: 0x1234_5678,
            mode: PosixFileMode::regular(0o640),
            nlink: 3,
            uid: 1000,
            gid: 100,
            rdev: 0,
            size: 10,
            blksize: 4096,
            blocks: 8,
            atime: TimeSpec::new(1_700_000_000, 1),
            mtime: TimeSpec::new(1_700_000_001, 2),
            ctime: TimeSpec::new(1_700_000_002, 3),
            birthtime: TimeSpec::new(1_600_000_000, 4),
            flags: 0x20,
            gen: 77,
        }
    }

    pub(super) fn sample_vfs() -> VfsStat {
        VfsStat {
            bsize: 4096,
            frsize: 4096,
            blocks: 1 << 20,
            bfree: 1 << 19,
            bavail: 1 << 18,
            files: 65536,
            ffree: 60000,
            favail: 59000,
            fsid: 42,
            flag: 1,
            namemax: 255,
        }
    }

    // ====== Selection Tests ======

    #[test]
    fn test_from_names() {
        assert_eq!(
            Platform::from_names("linux", "x86_64").unwrap(),
            Platform::LINUX_X86_64
        );
        assert_eq!(
            Platform::from_names("freebsd", "x86_64").unwrap(),
            Platform::FREEBSD_X86_64
        );
        assert_eq!(
            Platform::from_names("linux", "arm").unwrap().layout(),
            Layout::LinuxIlp32
        );
    }

    #[test]
    fn test_unsupported_pairs() {
        assert!(matches!(
            Platform::from_names("macos", "aarch64"),
            Err(PlatformError::Unsupported { .. })
        ));
        assert!(Platform::from_names("freebsd", "aarch64").is_err());
        assert!(Platform::from_names("linux", "riscv64").is_err());
    }

    #[test]
    fn test_every_layout_matches_documented_sizes() {
        for platform in Platform::ALL {
            platform.verify().unwrap();
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Platform::LINUX_AARCH64.to_string(), "linux-aarch64");
    }

    #[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[test]
    fn test_init_on_host() {
        let platform = init().unwrap();
        assert_eq!(current(), Some(platform));
        assert_eq!(platform.stat_size(), size_of::<libc::stat>());
        assert_eq!(platform.statvfs_size(), size_of::<libc::statvfs>());
    }

    // ====== Encoding Tests ======

    #[test]
    fn test_encode_rejects_short_buffer() {
        let mut buf = [0u8; 64];
        let err = Platform::LINUX_X86_64
            .encode_stat(&sample_stat(), &mut buf)
            .unwrap_err();
        assert_eq!(
            err,
            MarshalError::BufferTooSmall {
                structure: "stat",
                needed: 144,
                actual: 64
            }
        );
    }

    #[test]
    fn test_encode_writes_exactly_native_size() {
        for platform in Platform::ALL {
            let mut buf = vec![0xAAu8; 512];
            platform.encode_stat(&sample_stat(), &mut buf).unwrap();
            assert!(buf[platform.stat_size()..].iter().all(|b| *b == 0xAA));

            let mut buf = vec![0xAAu8; 512];
            platform.encode_statvfs(&sample_vfs(), &mut buf).unwrap();
            assert!(buf[platform.statvfs_size()..].iter().all(|b| *b == 0xAA));
        }
    }

    #[test]
    fn test_timespec_sentinels_per_os() {
        let mut buf = [0u8; 16];
        Platform::LINUX_X86_64
            .encode_timespec(TimeSpec::NOW, &mut buf)
            .unwrap();
        let raw: [i64; 2] = read_struct(&buf);
        assert_eq!(raw[1], (1 << 30) - 1);

        Platform::FREEBSD_X86_64
            .encode_timespec(TimeSpec::OMIT, &mut buf)
            .unwrap();
        let raw: [i64; 2] = read_struct(&buf);
        assert_eq!(raw[1], -2);
    }

    #[test]
    fn test_timespec_round_trip_all_platforms() {
        for platform in Platform::ALL {
            for time in [TimeSpec::NOW, TimeSpec::OMIT, TimeSpec::new(1_000_000, 999_999_999)] {
                let mut buf = [0u8; 16];
                platform.encode_timespec(time, &mut buf).unwrap();
                assert_eq!(platform.decode_timespec(&buf).unwrap(), time, "{}", platform);
            }
        }
    }

    #[test]
    fn test_ilp32_seconds_overflow() {
        let mut buf = [0u8; 8];
        let err = Platform::LINUX_X86
            .encode_timespec(TimeSpec::new(i64::from(i32::MAX) + 1, 0), &mut buf)
            .unwrap_err();
        assert!(matches!(err, MarshalError::Overflow { field: "tv_sec", .. }));
    }

    proptest! {
        #[test]
        fn prop_stat_encode_size(size in 0i64..i64::MAX, ino in 0u64..u32::MAX as u64, nlink in 0u64..u16::MAX as u64) {
            let stat = FileStat { size, ino, nlink, ..sample_stat() };
            for platform in Platform::ALL {
                let mut buf = vec![0x55u8; platform.stat_size() + 8];
                platform.encode_stat(&stat, &mut buf).unwrap();
                prop_assert!(buf[platform.stat_size()..].iter().all(|b| *b == 0x55));
            }
        }
    }
}
