//! Secure memory utilities for identifier and key material.
//!
//! This module provides:
//! - [`SecureBuffer`]: zero-initialised, canary-guarded, `mlock`'d buffer
//!   that is zeroized on drop and masked in `Debug`/`Display`
//! - [`allocate`] / [`free`] / [`wipe`]: explicit lifecycle helpers
//! - [`constant_time_compare`]: equality check with no early exit
//! - [`random_bytes`]: OS CSPRNG output in a secure buffer
//! - [`copy`] / [`clone_buffer`]: bounds-checked transfer helpers
//! - [`disable_core_dumps`]: process hardening on Unix

use crate::error::{IdentityError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::Zeroize;

/// Largest buffer [`allocate`] and [`random_bytes`] will hand out (16 MiB).
pub const MAX_BUFFER_SIZE: usize = 16_777_216;

/// Length of the trailing canary on secure allocations.
pub const CANARY_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Platform-specific memory locking
// ---------------------------------------------------------------------------

/// RAII guard that unlocks memory on drop.
///
/// If `mlock` fails (insufficient privileges or quota) the region is simply
/// not locked. A warning is logged once per process.
struct LockedRegion {
    ptr: *const u8,
    len: usize,
    locked: bool,
}

// SAFETY: The pointer is only used for mlock/munlock system calls, which
// are thread-safe. The pointed-to data is owned by the enclosing
// SecureBuffer and is never accessed through LockedRegion.
unsafe impl Send for LockedRegion {}
unsafe impl Sync for LockedRegion {}

impl LockedRegion {
    const fn unlocked() -> Self {
        Self {
            ptr: std::ptr::null(),
            len: 0,
            locked: false,
        }
    }

    fn try_lock(ptr: *const u8, len: usize) -> Self {
        let locked = platform::try_mlock(ptr, len);
        if !locked && len > 0 {
            static WARNED: std::sync::Once = std::sync::Once::new();
            WARNED.call_once(|| {
                tracing::warn!(
                    "mlock failed: secure buffers may be swapped to disk \
                     (consider raising RLIMIT_MEMLOCK)"
                );
            });
        }
        Self { ptr, len, locked }
    }
}

impl Drop for LockedRegion {
    fn drop(&mut self) {
        if self.locked {
            platform::try_munlock(self.ptr, self.len);
        }
    }
}

// ---------------------------------------------------------------------------
// SecureBuffer
// ---------------------------------------------------------------------------

/// Byte buffer for secret material.
///
/// Buffers produced by [`allocate`], [`random_bytes`], [`clone_buffer`] and
/// [`SecureBuffer::from_slice`] are *tagged* secure: they carry a trailing
/// random canary and are `mlock`'d where the platform allows. Buffers adopted
/// through [`SecureBuffer::wrap`] are untagged. Every buffer is zeroized on
/// drop regardless of its tag.
pub struct SecureBuffer {
    // Declared before `bytes` so munlock runs before the allocation is freed.
    lock: LockedRegion,
    bytes: Vec<u8>,
    len: usize,
    canary: Option<[u8; CANARY_LEN]>,
}

impl SecureBuffer {
    /// Build a tagged buffer of `len` zero bytes followed by a fresh canary.
    fn tagged(len: usize) -> Result<Self> {
        let total = len
            .checked_add(CANARY_LEN)
            .ok_or_else(|| IdentityError::InvalidSize(format!("{len} bytes overflows")))?;
        let mut canary = [0u8; CANARY_LEN];
        OsRng
            .try_fill_bytes(&mut canary)
            .map_err(|e| IdentityError::CryptoFailure(format!("CSPRNG fill failed: {e}")))?;

        let mut bytes = vec![0u8; total];
        bytes[len..].copy_from_slice(&canary);
        let lock = LockedRegion::try_lock(bytes.as_ptr(), bytes.len());
        Ok(Self {
            lock,
            bytes,
            len,
            canary: Some(canary),
        })
    }

    /// Create a tagged secure buffer holding a copy of `data`.
    ///
    /// The caller should zeroize the source after calling this.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidSize` if `data` exceeds
    /// [`MAX_BUFFER_SIZE`], or `CryptoFailure` if the canary cannot be drawn.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_BUFFER_SIZE {
            return Err(IdentityError::InvalidSize(format!(
                "{} bytes exceeds the {MAX_BUFFER_SIZE} byte ceiling",
                data.len()
            )));
        }
        let mut buf = Self::tagged(data.len())?;
        buf.expose_mut().copy_from_slice(data);
        Ok(buf)
    }

    /// Adopt caller-owned bytes without tagging them.
    ///
    /// The bytes are still zeroized on drop, but carry no canary and
    /// [`is_secure`](Self::is_secure) reports `false`.
    #[must_use]
    pub fn wrap(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            lock: LockedRegion::unlocked(),
            bytes,
            len,
            canary: None,
        }
    }

    /// Expose the payload bytes (canary excluded).
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Mutable access to the payload bytes (canary excluded).
    #[must_use]
    pub fn expose_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.len]
    }

    /// Payload length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if this buffer was produced by a secure allocation.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.canary.is_some()
    }

    /// Returns `true` if the underlying memory is `mlock`'d.
    #[must_use]
    pub const fn is_mlocked(&self) -> bool {
        self.lock.locked
    }

    /// Returns `false` if the bytes following the payload no longer match the
    /// canary recorded at allocation. Untagged buffers always report `true`.
    #[must_use]
    pub fn canary_intact(&self) -> bool {
        self.canary.map_or(true, |canary| {
            constant_time_compare(&self.bytes[self.len..], &canary) == 0
        })
    }

    /// Zero the payload in place. The canary is left untouched.
    pub fn wipe(&mut self) {
        self.expose_mut().zeroize();
    }

    /// Returns `true` if every payload byte is zero.
    #[must_use]
    pub fn is_zeroed(&self) -> bool {
        self.expose().iter().fold(0u8, |acc, &b| acc | b) == 0
    }

    /// Wipe the whole allocation and hand it back, canary included.
    pub(crate) fn into_wiped_vec(mut self) -> Vec<u8> {
        self.bytes.as_mut_slice().zeroize();
        std::mem::take(&mut self.bytes)
    }

    /// Hand back the first `keep` payload bytes, wiping everything after them.
    pub(crate) fn into_prefix_vec(mut self, keep: usize) -> Vec<u8> {
        let keep = keep.min(self.len);
        self.bytes[keep..].zeroize();
        let mut bytes = std::mem::take(&mut self.bytes);
        bytes.truncate(keep);
        bytes
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBuffer<{}>(***)", self.len)
    }
}

impl fmt::Display for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBuffer<{}>(***)", self.len)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle helpers
// ---------------------------------------------------------------------------

pub(crate) fn check_size(size: usize) -> Result<()> {
    if size == 0 {
        return Err(IdentityError::InvalidSize("size must be > 0".into()));
    }
    if size > MAX_BUFFER_SIZE {
        return Err(IdentityError::InvalidSize(format!(
            "{size} bytes exceeds the {MAX_BUFFER_SIZE} byte ceiling"
        )));
    }
    Ok(())
}

/// Allocate a zero-initialised, tagged secure buffer.
///
/// # Errors
///
/// Returns `IdentityError::InvalidSize` if `size` is 0 or above
/// [`MAX_BUFFER_SIZE`].
pub fn allocate(size: usize) -> Result<SecureBuffer> {
    check_size(size)?;
    SecureBuffer::tagged(size)
}

/// Wipe and release a buffer.
///
/// `None` and empty buffers are accepted and ignored. The buffer is consumed
/// and zeroized on every path, including the error paths.
///
/// # Errors
///
/// - `IdentityError::TamperingDetected` if the canary was overwritten
/// - `IdentityError::SizeMismatch` if `expected_size` differs from the length
pub fn free(buffer: Option<SecureBuffer>, expected_size: Option<usize>) -> Result<()> {
    let Some(mut buffer) = buffer else {
        return Ok(());
    };
    if buffer.is_empty() {
        return Ok(());
    }
    buffer.wipe();
    if !buffer.canary_intact() {
        return Err(IdentityError::TamperingDetected(format!(
            "canary of {}-byte buffer was overwritten",
            buffer.len()
        )));
    }
    if let Some(expected) = expected_size {
        if expected != buffer.len() {
            return Err(IdentityError::SizeMismatch {
                expected,
                actual: buffer.len(),
            });
        }
    }
    Ok(())
}

/// Zero-fill `buffer` in place. Empty input is a no-op.
pub fn wipe(buffer: &mut [u8]) {
    buffer.zeroize();
}

/// Compare two byte strings without an early exit.
///
/// Returns 0 iff both have the same length and contents. Every byte of the
/// longer input is visited whatever the position of the first difference,
/// and a length mismatch always yields a non-zero result.
#[must_use]
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> i32 {
    let longest = a.len().max(b.len());
    let mut diff = u8::from(a.len() != b.len());
    for i in 0..longest {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= std::hint::black_box(x ^ y);
    }
    i32::from(std::hint::black_box(diff))
}

/// Constant-time equality as a boolean.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    constant_time_compare(a, b) == 0
}

/// Fill a new tagged buffer with `size` bytes from the OS CSPRNG.
///
/// # Errors
///
/// Returns `IdentityError::InvalidSize` for 0 or oversize requests, and
/// `IdentityError::CryptoFailure` if the CSPRNG fails.
pub fn random_bytes(size: usize) -> Result<SecureBuffer> {
    let mut buf = allocate(size)?;
    OsRng
        .try_fill_bytes(buf.expose_mut())
        .map_err(|e| IdentityError::CryptoFailure(format!("CSPRNG fill failed: {e}")))?;
    Ok(buf)
}

/// Copy `length` bytes from `src[src_offset..]` into `dst[dst_offset..]`.
///
/// # Errors
///
/// Returns `IdentityError::OutOfRange` if either range falls outside its
/// buffer or an offset computation overflows.
pub fn copy(
    src: &[u8],
    dst: &mut [u8],
    dst_offset: usize,
    src_offset: usize,
    length: usize,
) -> Result<()> {
    let src_end = src_offset
        .checked_add(length)
        .filter(|&end| end <= src.len())
        .ok_or_else(|| {
            IdentityError::OutOfRange(format!(
                "source range {src_offset}+{length} exceeds {} bytes",
                src.len()
            ))
        })?;
    let dst_end = dst_offset
        .checked_add(length)
        .filter(|&end| end <= dst.len())
        .ok_or_else(|| {
            IdentityError::OutOfRange(format!(
                "destination range {dst_offset}+{length} exceeds {} bytes",
                dst.len()
            ))
        })?;
    dst[dst_offset..dst_end].copy_from_slice(&src[src_offset..src_end]);
    Ok(())
}

/// Copy `buffer` into a new tagged secure buffer.
///
/// # Errors
///
/// Returns `IdentityError::InvalidArgument` when `buffer` is `None`.
pub fn clone_buffer(buffer: Option<&SecureBuffer>) -> Result<SecureBuffer> {
    let buffer =
        buffer.ok_or_else(|| IdentityError::InvalidArgument("cannot clone a null buffer".into()))?;
    SecureBuffer::from_slice(buffer.expose())
}

/// Returns `true` if `buffer` carries the secure tag.
#[must_use]
pub const fn is_secure_buffer(buffer: &SecureBuffer) -> bool {
    buffer.is_secure()
}

// ---------------------------------------------------------------------------
// Core dump disabling
// ---------------------------------------------------------------------------

/// Disable core dumps for the current process.
///
/// On Unix: sets `RLIMIT_CORE` to 0 (both soft and hard limits).
/// On non-Unix: no-op (returns `Ok`).
///
/// # Errors
///
/// Returns `IdentityError::CryptoFailure` if the `setrlimit` call fails.
pub fn disable_core_dumps() -> Result<()> {
    platform::disable_core_dumps_impl()
}

#[cfg(unix)]
mod platform {
    use crate::error::{IdentityError, Result};

    pub(super) fn try_mlock(ptr: *const u8, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        // SAFETY: mlock is safe to call with any valid pointer/length pair.
        // If the pointer is invalid, the kernel returns ENOMEM which we handle.
        unsafe { libc::mlock(ptr.cast(), len) == 0 }
    }

    pub(super) fn try_munlock(ptr: *const u8, len: usize) {
        if len == 0 {
            return;
        }
        // SAFETY: munlock is safe to call. Failure is non-critical.
        unsafe {
            libc::munlock(ptr.cast(), len);
        }
    }

    pub(super) fn disable_core_dumps_impl() -> Result<()> {
        let limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: setrlimit with RLIMIT_CORE is a standard POSIX call.
        let ret = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &raw const limit) };
        if ret != 0 {
            return Err(IdentityError::CryptoFailure(
                "failed to disable core dumps via RLIMIT_CORE".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod platform {
    use crate::error::Result;

    pub(super) fn try_mlock(_ptr: *const u8, _len: usize) -> bool {
        false
    }

    pub(super) fn try_munlock(_ptr: *const u8, _len: usize) {}

    pub(super) fn disable_core_dumps_impl() -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
