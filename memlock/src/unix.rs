use crate::error::MemlockError;
use once_cell::sync::Lazy;
use std::ptr;

static PAGE_SIZE: Lazy<usize> =
    Lazy::new(|| unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize });

#[inline]
fn as_mut_ptr(memory: &mut [u8]) -> *mut libc::c_void {
    memory.as_mut_ptr() as *mut libc::c_void
}

#[inline]
fn as_len(memory: &[u8]) -> libc::size_t {
    memory.len() as libc::size_t
}

/// Allocates an anonymous, private, read/write mapping of `size` bytes.
///
/// The fresh mapping is wiped before it is handed out in case the kernel
/// recycled pages with remnant data.
pub fn alloc(size: usize) -> Result<&'static mut [u8], MemlockError> {
    if size == 0 {
        return Err(MemlockError::InvalidSize);
    }

    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(MemlockError::Mmap(
            std::io::Error::last_os_error().to_string(),
        ));
    }

    let memory = unsafe { std::slice::from_raw_parts_mut(ptr as *mut u8, size) };

    for byte in memory.iter_mut() {
        *byte = 0;
    }

    Ok(memory)
}

/// Releases a mapping previously returned by `alloc`.
///
/// The memory is wiped before the unmap so the pages never reach the free
/// list with live content.
pub fn free(ptr: &mut [u8]) -> Result<(), MemlockError> {
    if ptr.is_empty() {
        return Ok(());
    }

    for byte in ptr.iter_mut() {
        *byte = 0;
    }

    let result = unsafe { libc::munmap(as_mut_ptr(ptr), as_len(ptr)) };

    if result != 0 {
        return Err(MemlockError::Unmap(format!(
            "{:p}: {}",
            ptr.as_ptr(),
            std::io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Attempts the on-fault lock variant. Only whole pages already mapped are
/// charged against RLIMIT_MEMLOCK as they fault in.
#[cfg(target_os = "linux")]
fn try_mlock_onfault(ptr: &mut [u8]) -> Result<(), i32> {
    let result = unsafe { libc::mlock2(as_mut_ptr(ptr), as_len(ptr), libc::MLOCK_ONFAULT) };
    if result != 0 {
        return Err(std::io::Error::last_os_error().raw_os_error().unwrap_or(0));
    }
    Ok(())
}

/// Pins a memory region so the kernel cannot page it out to swap.
///
/// On Linux the region is first excluded from core dumps, then locked with
/// `mlock2(MLOCK_ONFAULT)`; kernels that reject the newer syscall with
/// `ENOSYS` or `EINVAL` get the baseline `mlock`.
pub fn lock(ptr: &mut [u8]) -> Result<(), MemlockError> {
    if ptr.is_empty() {
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    unsafe {
        libc::madvise(as_mut_ptr(ptr), as_len(ptr), libc::MADV_DONTDUMP);
    }

    #[cfg(target_os = "linux")]
    match try_mlock_onfault(ptr) {
        Ok(()) => return Ok(()),
        Err(errno) if errno == libc::ENOSYS || errno == libc::EINVAL => {}
        Err(errno) => {
            return Err(MemlockError::Lock(format!(
                "{:p}, limit reached? [errno {}]",
                ptr.as_ptr(),
                errno
            )));
        }
    }

    let result = unsafe { libc::mlock(as_mut_ptr(ptr), as_len(ptr)) };

    if result != 0 {
        return Err(MemlockError::Lock(format!(
            "{:p}, limit reached? [{}]",
            ptr.as_ptr(),
            std::io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Unpins a memory region previously pinned with `lock`.
pub fn unlock(ptr: &mut [u8]) -> Result<(), MemlockError> {
    if ptr.is_empty() {
        return Ok(());
    }

    let result = unsafe { libc::munlock(as_mut_ptr(ptr), as_len(ptr)) };

    if result != 0 {
        return Err(MemlockError::Unlock(format!(
            "{:p}: {}",
            ptr.as_ptr(),
            std::io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Returns the system's page size.
pub fn page_size() -> usize {
    *PAGE_SIZE
}

/// Disables creation of core dump files for the current process.
pub fn disable_core_dumps() -> Result<(), MemlockError> {
    let rlimit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };

    let result = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &rlimit) };

    if result != 0 {
        return Err(MemlockError::Rlimit(
            std::io::Error::last_os_error().to_string(),
        ));
    }

    Ok(())
}
