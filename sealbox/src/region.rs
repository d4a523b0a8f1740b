use crate::error::{Error, Result};
use crate::util;
use log::{error, trace};
use std::fmt;

/// A single-owner range of page-aligned, anonymous, read/write memory,
/// pinned against paging.
///
/// The region is never reallocated or resized; the caller-visible slice is
/// exactly the requested length even though the kernel maps whole pages.
/// Releasing a region zeroizes the full mapping before the pages go back to
/// the OS, and `Drop` performs the same teardown as a safety net, so an
/// early return or panic never leaves secret bytes behind.
pub struct LockedRegion {
    ptr: *mut u8,
    /// Logical length visible through `as_slice`. May be shortened with
    /// `truncate` after an in-place decrypt.
    len: usize,
    /// Full mapping length; this is what gets wiped, unpinned and unmapped.
    mapped: usize,
}

// The region is an exclusively-owned mapping; moving it between threads is
// safe, shared access is governed by the usual borrow rules.
unsafe impl Send for LockedRegion {}
unsafe impl Sync for LockedRegion {}

impl LockedRegion {
    /// Allocates `size` bytes of pinned memory.
    ///
    /// On a pin failure the fresh mapping is released before the error is
    /// returned, so no unpinned pages escape.
    pub fn allocate(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidSize);
        }

        let memory = memlock::alloc(size)?;

        if let Err(lock_err) = memlock::lock(memory) {
            let reason = lock_err.to_string();
            if let Err(free_err) = memlock::free(memory) {
                error!("failed to release unpinnable mapping: {}", free_err);
            }
            return Err(Error::Lock(reason));
        }

        trace!("allocated {} locked bytes", size);

        Ok(Self {
            ptr: memory.as_mut_ptr(),
            len: size,
            mapped: size,
        })
    }

    /// Logical length of the region in bytes. Zero once the region has been
    /// released.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the region has been released or truncated to nothing.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the handle has been cleared by `free`. Distinct from
    /// `is_empty`: a decrypt result truncated to zero length still owns its
    /// mapping.
    pub fn is_released(&self) -> bool {
        self.ptr.is_null()
    }

    /// Read-only view of the logical range.
    pub fn as_slice(&self) -> &[u8] {
        if self.ptr.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Mutable view of the logical range.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.ptr.is_null() {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Shortens the logical length. The full mapping is still wiped and
    /// released in `free`.
    pub(crate) fn truncate(&mut self, len: usize) {
        debug_assert!(len <= self.len);
        if len < self.len {
            self.len = len;
        }
    }

    /// Overwrites the full mapping with zeros.
    pub fn zero(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        let full = unsafe { std::slice::from_raw_parts_mut(self.ptr, self.mapped) };
        util::zero(full);
    }

    /// Wipes the full mapping, unpins the pages and releases them.
    ///
    /// The handle is cleared either way (`len() == 0` afterwards), so a
    /// repeat call is a no-op success. Unpin and unmap errors are surfaced,
    /// combined when both occur, but the wipe has always completed before
    /// any error return.
    pub fn free(&mut self) -> Result<()> {
        if self.ptr.is_null() {
            return Ok(());
        }

        let full = unsafe { std::slice::from_raw_parts_mut(self.ptr, self.mapped) };
        util::zero(full);

        let unlock_result = memlock::unlock(full);
        let unmap_result = memlock::free(full);

        self.ptr = std::ptr::null_mut();
        self.len = 0;
        self.mapped = 0;

        match (unlock_result, unmap_result) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) => Err(e.into()),
            (Ok(()), Err(e)) => Err(e.into()),
            (Err(e1), Err(e2)) => Err(Error::from(e1).combine(e2.into())),
        }
    }
}

impl Drop for LockedRegion {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        // Best effort: the wipe is unconditional, release errors can only
        // be logged from here.
        if let Err(e) = self.free() {
            error!("failed to release locked region on drop: {}", e);
        }
    }
}

impl fmt::Debug for LockedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedRegion")
            .field("len", &self.len)
            .field("mapped", &self.mapped)
            .finish()
    }
}

/// Allocates a pinned region of `size` bytes.
pub fn allocate_locked(size: usize) -> Result<LockedRegion> {
    LockedRegion::allocate(size)
}

/// Wipes and releases a pinned region. No-op success on a cleared handle.
pub fn free_locked(region: &mut LockedRegion) -> Result<()> {
    region.free()
}

/// Overwrites a pinned region with zeros.
pub fn zero_locked(region: &mut LockedRegion) {
    region.zero();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_exact_length() {
        for size in [1, 15, 16, 4095, 4096, 4097, 64 * 1024] {
            let region = LockedRegion::allocate(size)
                .unwrap_or_else(|e| panic!("allocate({}) failed: {}", size, e));
            assert_eq!(region.len(), size);
            assert_eq!(region.as_slice().len(), size);
        }
    }

    #[test]
    fn test_allocate_zero_rejected() {
        assert!(matches!(
            LockedRegion::allocate(0),
            Err(Error::InvalidSize)
        ));
    }

    #[test]
    fn test_read_write() {
        let mut region = LockedRegion::allocate(64).unwrap();
        assert!(region.as_slice().iter().all(|&b| b == 0));

        for (i, byte) in region.as_mut_slice().iter_mut().enumerate() {
            *byte = i as u8;
        }
        assert_eq!(region.as_slice()[63], 63);

        region.free().unwrap();
    }

    #[test]
    fn test_zero() {
        let mut region = LockedRegion::allocate(32).unwrap();
        region.as_mut_slice().fill(0xAB);

        region.zero();

        assert!(region.as_slice().iter().all(|&b| b == 0));
        region.free().unwrap();
    }

    #[test]
    fn test_free_clears_handle_and_is_idempotent() {
        let mut region = LockedRegion::allocate(16).unwrap();

        region.free().expect("first free failed");
        assert_eq!(region.len(), 0);
        assert!(region.is_empty());
        assert!(region.as_slice().is_empty());

        region.free().expect("second free should be a no-op success");
    }

    #[test]
    fn test_truncate_keeps_mapping_releasable() {
        let mut region = LockedRegion::allocate(100).unwrap();
        region.as_mut_slice().fill(0x11);

        region.truncate(10);
        assert_eq!(region.len(), 10);
        assert_eq!(region.as_slice(), &[0x11; 10]);

        // The full 100-byte mapping is still wiped and unmapped.
        region.free().unwrap();
    }

    #[test]
    fn test_free_function_wrappers() {
        let mut region = allocate_locked(16).unwrap();
        zero_locked(&mut region);
        free_locked(&mut region).unwrap();
        free_locked(&mut region).unwrap();
    }
}
