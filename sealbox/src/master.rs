//! Process master key lifecycle.
//!
//! A 32-byte random key held in a single [`LockedRegion`]. Every envelope
//! derives its own key from this one via HMAC-SHA256 over a random salt, so
//! the master key itself never touches a cipher directly and is never
//! written into an envelope.

use crate::error::{Error, Result};
use crate::region::LockedRegion;
use crate::util;
use log::debug;
use std::sync::{Mutex, PoisonError};

/// Master key length in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// Holder for one master key with explicit `init`/`shutdown`.
///
/// A process-global instance backs [`init`], [`shutdown`] and
/// [`with_master_key`]; callers that want no global state can construct
/// their own manager and thread it through instead. The single mutex
/// serializes initialization, teardown and key reads, so `init` after
/// `shutdown` is well-defined and yields a fresh random key.
pub struct MasterKeyManager {
    key: Mutex<Option<LockedRegion>>,
}

impl MasterKeyManager {
    pub const fn new() -> Self {
        Self {
            key: Mutex::new(None),
        }
    }

    /// At-most-once initialization. A second call while a key is bound is a
    /// successful no-op. On failure any partial allocation is released and
    /// the manager stays uninitialized.
    pub fn init(&self) -> Result<()> {
        let mut guard = self.key.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Ok(());
        }

        let mut region = LockedRegion::allocate(MASTER_KEY_LEN)?;
        if let Err(fill_err) = util::fill_random(region.as_mut_slice()) {
            return Err(match region.free() {
                Ok(()) => fill_err,
                Err(free_err) => fill_err.combine(free_err),
            });
        }

        *guard = Some(region);
        debug!("master key initialized");
        Ok(())
    }

    /// Wipes and releases the key. No-op when uninitialized. A later `init`
    /// binds a fresh random key.
    pub fn shutdown(&self) -> Result<()> {
        let mut guard = self.key.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            None => Ok(()),
            Some(mut region) => {
                region.zero();
                let result = region.free();
                debug!("master key shut down");
                result
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs `f` over the 32 key bytes while the manager's lock is held.
    ///
    /// The view is read-only and must not be copied into unlocked memory;
    /// derive from it and let the bytes go.
    pub fn with_key<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> Result<R>,
    {
        let guard = self.key.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            None => Err(Error::Uninitialized),
            Some(region) => f(region.as_slice()),
        }
    }
}

impl Default for MasterKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

static MASTER: MasterKeyManager = MasterKeyManager::new();

/// Initializes the process master key. Idempotent.
pub fn init() -> Result<()> {
    MASTER.init()
}

/// Wipes and releases the process master key, permitting a later `init`.
pub fn shutdown() -> Result<()> {
    MASTER.shutdown()
}

/// True when the process master key is bound.
pub fn is_initialized() -> bool {
    MASTER.is_initialized()
}

/// Runs `f` over the process master key bytes.
pub fn with_master_key<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&[u8]) -> Result<R>,
{
    MASTER.with_key(f)
}
