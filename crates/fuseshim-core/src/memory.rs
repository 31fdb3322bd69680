//! Non-owning views over memory that belongs to libfuse.
//!
//! A view is only valid for the duration of the operation call that received
//! it. The lifetime parameter ties every view to that call, so the borrow
//! checker rejects code that stores a view or moves it into a thread. Copy
//! the bytes out with [`ReadOnlyNativeMemory::to_vec`] when they must outlive
//! the call.

use std::borrow::Cow;
use std::ffi::{CStr, OsStr};
use std::fmt;
use std::marker::PhantomData;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

/// Read-only view over foreign memory.
#[derive(Clone, Copy)]
pub struct ReadOnlyNativeMemory<'a> {
    ptr: *const u8,
    len: usize,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> ReadOnlyNativeMemory<'a> {
    /// An empty view that never touches memory.
    pub const fn empty() -> Self {
        ReadOnlyNativeMemory {
            ptr: ptr::null(),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Wraps `len` bytes at `ptr`. A null pointer or zero length gives an
    /// empty view.
    ///
    /// # Safety
    ///
    /// Unless empty, `ptr` must be readable for `len` bytes for the whole of
    /// `'a`, and nothing may write to it during that time.
    pub unsafe fn from_raw(ptr: *const u8, len: usize) -> Self {
        if ptr.is_null() || len == 0 {
            return Self::empty();
        }
        ReadOnlyNativeMemory {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    pub fn from_slice(bytes: &'a [u8]) -> Self {
        ReadOnlyNativeMemory {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &'a [u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: non-empty views were built from a pointer valid for `len`
        // bytes over `'a`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Copies the bytes into an owned buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl Default for ReadOnlyNativeMemory<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ReadOnlyNativeMemory<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyNativeMemory")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Writable view over foreign memory, such as a `read` destination buffer.
pub struct NativeMemory<'a> {
    ptr: *mut u8,
    len: usize,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> NativeMemory<'a> {
    pub fn empty() -> Self {
        NativeMemory {
            ptr: ptr::null_mut(),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Wraps `len` writable bytes at `ptr`. A null pointer or zero length
    /// gives an empty view.
    ///
    /// # Safety
    ///
    /// Unless empty, `ptr` must be valid for reads and writes of `len` bytes
    /// for the whole of `'a` and not aliased by any other live reference.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Self {
        if ptr.is_null() || len == 0 {
            return Self::empty();
        }
        NativeMemory {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    pub fn from_slice(bytes: &'a mut [u8]) -> Self {
        NativeMemory {
            ptr: bytes.as_mut_ptr(),
            len: bytes.len(),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: see `from_raw`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: see `from_raw`; `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Copies as much of `src` as fits and returns the number of bytes copied.
    pub fn copy_from(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.len);
        self.as_mut_slice()[..n].copy_from_slice(&src[..n]);
        n
    }

    /// Writes `value` followed by a NUL, truncating so the terminator always
    /// fits. Returns `false` if `value` had to be truncated or the view is
    /// empty.
    pub fn write_c_str(&mut self, value: &[u8]) -> bool {
        if self.len == 0 {
            return false;
        }
        let room = self.len - 1;
        let n = value.len().min(room);
        let dst = self.as_mut_slice();
        dst[..n].copy_from_slice(&value[..n]);
        dst[n] = 0;
        n == value.len()
    }
}

impl fmt::Debug for NativeMemory<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeMemory")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Decodes UTF-8 path bytes. Frequent literals come back as static strings
/// and other valid input is borrowed, so neither allocates.
pub fn decode_utf8(bytes: &[u8]) -> Cow<'_, str> {
    match bytes {
        b"/" => Cow::Borrowed("/"),
        b"\\" => Cow::Borrowed("\\"),
        b"*" => Cow::Borrowed("*"),
        b"*.*" => Cow::Borrowed("*.*"),
        b"?" => Cow::Borrowed("?"),
        _ => String::from_utf8_lossy(bytes),
    }
}

/// A NUL-terminated path passed in by libfuse.
#[derive(Clone, Copy, Default)]
pub struct NativePath<'a> {
    bytes: ReadOnlyNativeMemory<'a>,
}

impl<'a> NativePath<'a> {
    /// # Safety
    ///
    /// `ptr` must be null or point to a NUL-terminated string that stays
    /// valid and unmodified for `'a`.
    pub unsafe fn from_ptr(ptr: *const libc::c_char) -> Self {
        if ptr.is_null() {
            return NativePath::default();
        }
        let len = libc::strlen(ptr);
        NativePath {
            bytes: ReadOnlyNativeMemory::from_raw(ptr.cast::<u8>(), len),
        }
    }

    pub fn from_c_str(value: &'a CStr) -> Self {
        NativePath {
            bytes: ReadOnlyNativeMemory::from_slice(value.to_bytes()),
        }
    }

    /// Path bytes without the terminator.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes.as_slice()
    }

    pub fn as_os_str(&self) -> &'a OsStr {
        OsStr::from_bytes(self.as_bytes())
    }

    pub fn as_path(&self) -> &'a Path {
        Path::new(self.as_os_str())
    }

    /// The path as text; invalid UTF-8 is replaced.
    pub fn to_str(&self) -> Cow<'a, str> {
        decode_utf8(self.as_bytes())
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.as_bytes() == b"/"
    }
}

impl fmt::Display for NativePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

impl fmt::Debug for NativePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_str())
    }
}
