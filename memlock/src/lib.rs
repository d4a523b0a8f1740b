//! # memlock
//!
//! Cross-platform wrapper for the memory syscalls behind locked allocations.
//!
//! This library provides a platform-independent interface for:
//! - Anonymous page-granular allocation and deallocation
//! - Pinning memory in RAM to prevent swapping to disk
//! - Process hardening (core dump suppression)
//!
//! On Linux, pinning prefers `mlock2(MLOCK_ONFAULT)` and falls back to the
//! baseline `mlock` when the kernel rejects the newer syscall. Mappings are
//! wiped on allocation and again before release.

mod error;

#[cfg(target_os = "linux")]
pub(crate) mod unix;
#[cfg(target_os = "linux")]
use unix as platform;

#[cfg(target_os = "macos")]
pub(crate) mod unix;
#[cfg(target_os = "macos")]
use unix as platform;

#[cfg(target_os = "freebsd")]
pub(crate) mod unix;
#[cfg(target_os = "freebsd")]
use unix as platform;

pub use error::MemlockError;

// Platform-agnostic API

/// Allocates an anonymous, private, read/write memory region of `size` bytes.
pub fn alloc(size: usize) -> Result<&'static mut [u8], MemlockError> {
    platform::alloc(size)
}

/// Wipes and releases a memory region previously allocated with `alloc`.
pub fn free(ptr: &mut [u8]) -> Result<(), MemlockError> {
    platform::free(ptr)
}

/// Pins a memory region so it cannot be swapped to disk.
pub fn lock(ptr: &mut [u8]) -> Result<(), MemlockError> {
    platform::lock(ptr)
}

/// Unpins a memory region previously pinned with `lock`.
pub fn unlock(ptr: &mut [u8]) -> Result<(), MemlockError> {
    platform::unlock(ptr)
}

/// Returns the system's page size.
pub fn page_size() -> usize {
    platform::page_size()
}

/// Disables creation of core dump files for the current process.
pub fn disable_core_dumps() -> Result<(), MemlockError> {
    platform::disable_core_dumps()
}
