//! Secret envelopes: authenticated ciphertext held in locked memory.
//!
//! An envelope is one [`LockedRegion`] laid out as
//! `salt ‖ nonce ‖ ciphertext ‖ mac`:
//!
//! ```text
//! offset        length   field
//! 0             16       salt
//! 16            12       nonce
//! 28            N+16     ciphertext (AES-GCM tag appended)
//! 28+N+16       32       mac (only when integrity checking is on)
//! ```
//!
//! The per-envelope key is HMAC-SHA256(master key, salt) and is never stored;
//! decrypting re-derives it. Nonces are 12 random bytes per envelope, which
//! keeps collision odds negligible at realistic volumes; no counter mode is
//! offered.

use crate::config;
use crate::crypto::{LockedAead, LockedHmac, HMAC_OUTPUT_LEN};
use crate::error::{Error, Result};
use crate::master;
use crate::region::LockedRegion;
use crate::util;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Envelope salt length in bytes.
pub const SALT_LEN: usize = 16;
/// Envelope nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// Envelope integrity trailer length in bytes.
pub const MAC_LEN: usize = 32;

/// Derives the per-envelope key from the master key and a salt, into a
/// fresh locked region. The HMAC holder is wiped before returning.
fn derive_key(salt: &[u8]) -> Result<LockedRegion> {
    let mut dk = LockedRegion::allocate(HMAC_OUTPUT_LEN)?;
    master::with_master_key(|key| {
        let mut hm = LockedHmac::new(key)?;
        hm.update(salt);
        hm.finalize_into(dk.as_mut_slice());
        hm.destroy()
    })?;
    Ok(dk)
}

/// Seals `plaintext` (which the callers guarantee lives in locked memory,
/// or is empty) into a fresh envelope.
///
/// Protocol: random salt in its own locked region; per-envelope key derived
/// and held in a locked region; AEAD built over that key; one envelope
/// region of exact total length; salt copied in and its staging region
/// released; nonce filled in place; ciphertext sealed in place; optional
/// integrity trailer; derived key wiped last. Every failure path releases
/// what it acquired, since a dropped [`LockedRegion`] wipes itself.
fn seal_plaintext(plaintext: &[u8]) -> Result<SecureBuffer> {
    master::init()?;

    let mut salt = LockedRegion::allocate(SALT_LEN)?;
    util::fill_random(salt.as_mut_slice())?;

    let mut dk = derive_key(salt.as_slice())?;
    let aead = LockedAead::new(dk.as_slice())?;

    let ct_len = plaintext.len() + aead.overhead();
    let has_mac = config::integrity_check();
    let total = SALT_LEN + NONCE_LEN + ct_len + if has_mac { MAC_LEN } else { 0 };

    let mut envelope = LockedRegion::allocate(total)?;

    envelope.as_mut_slice()[..SALT_LEN].copy_from_slice(salt.as_slice());
    salt.free()?;

    util::fill_random(&mut envelope.as_mut_slice()[SALT_LEN..SALT_LEN + NONCE_LEN])?;

    {
        let env = envelope.as_mut_slice();
        let (head, tail) = env.split_at_mut(SALT_LEN + NONCE_LEN);
        aead.seal(&mut tail[..ct_len], &head[SALT_LEN..], plaintext, b"")?;
    }
    aead.destroy()?;

    if has_mac {
        let mut hm = LockedHmac::new(dk.as_slice())?;
        let env = envelope.as_mut_slice();
        hm.update(&env[SALT_LEN..SALT_LEN + NONCE_LEN]);
        hm.update(&env[SALT_LEN + NONCE_LEN..SALT_LEN + NONCE_LEN + ct_len]);
        hm.finalize_into(&mut env[SALT_LEN + NONCE_LEN + ct_len..]);
        hm.destroy()?;
    }

    dk.free()?;

    debug!("sealed {} plaintext bytes into a {} byte envelope", plaintext.len(), total);

    Ok(SecureBuffer::from_parts(envelope, has_mac))
}

/// Opens an envelope into a fresh locked region holding the plaintext.
fn open_envelope(env: &[u8], has_mac: bool) -> Result<LockedRegion> {
    let ct_end = env.len() - if has_mac { MAC_LEN } else { 0 };
    let salt = &env[..SALT_LEN];
    let nonce = &env[SALT_LEN..SALT_LEN + NONCE_LEN];
    let ciphertext = &env[SALT_LEN + NONCE_LEN..ct_end];

    let mut dk = derive_key(salt)?;

    if has_mac {
        let mut hm = LockedHmac::new(dk.as_slice())?;
        hm.update(nonce);
        hm.update(ciphertext);
        let mut computed = [0u8; MAC_LEN];
        hm.finalize_into(&mut computed);
        hm.destroy()?;

        let matches = util::constant_time_eq(&computed, &env[ct_end..]);
        util::zero(&mut computed);
        if !matches {
            return Err(match dk.free() {
                Ok(()) => Error::IntegrityFailed,
                Err(e) => Error::IntegrityFailed.combine(e),
            });
        }
    }

    let aead = LockedAead::new(dk.as_slice())?;
    dk.free()?;

    let mut plaintext = LockedRegion::allocate(ciphertext.len())?;
    match aead.open(plaintext.as_mut_slice(), nonce, ciphertext, b"") {
        Ok(len) => {
            plaintext.truncate(len);
            aead.destroy()?;
            Ok(plaintext)
        }
        Err(open_err) => {
            // The rejected output was already wiped by `open`.
            let mut err = open_err;
            if let Err(e) = plaintext.free() {
                err = err.combine(e);
            }
            if let Err(e) = aead.destroy() {
                err = err.combine(e);
            }
            Err(err)
        }
    }
}

/// Recomputes the integrity trailer of an intact envelope.
fn verify_envelope_mac(env: &[u8]) -> Result<bool> {
    let ct_end = env.len() - MAC_LEN;

    let mut dk = derive_key(&env[..SALT_LEN])?;
    let mut hm = LockedHmac::new(dk.as_slice())?;
    hm.update(&env[SALT_LEN..SALT_LEN + NONCE_LEN]);
    hm.update(&env[SALT_LEN + NONCE_LEN..ct_end]);

    let mut computed = [0u8; MAC_LEN];
    hm.finalize_into(&mut computed);
    hm.destroy()?;

    let matches = util::constant_time_eq(&computed, &env[ct_end..]);
    util::zero(&mut computed);
    dk.free()?;
    Ok(matches)
}

/// Encrypts `data` into a new envelope.
///
/// The input is copied into a locked staging region and the caller's slice
/// is wiped immediately after the copy, before any cipher work happens, so
/// the plaintext never survives in unlocked memory past this call.
pub fn encrypt_to_memory(data: &mut [u8]) -> Result<SecureBuffer> {
    if data.is_empty() {
        return seal_plaintext(&[]);
    }

    let mut staging = LockedRegion::allocate(data.len())?;
    staging.as_mut_slice().copy_from_slice(data);
    util::zero(data);

    let sealed = seal_plaintext(staging.as_slice());
    match (sealed, staging.free()) {
        (Ok(buffer), Ok(())) => Ok(buffer),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(e2)) => Err(e.combine(e2)),
    }
}

/// Encrypts plaintext already held in a [`LockedRegion`].
///
/// The source is sealed directly, without an intermediate copy. After a
/// successful seal the source region is zeroized iff
/// [`config::set_zero_plaintext`] is set; otherwise it is left intact. A
/// released (cleared) region is rejected as `InvalidInput`.
pub fn encrypt_locked(source: &mut LockedRegion) -> Result<SecureBuffer> {
    if source.is_released() {
        return Err(Error::InvalidInput);
    }

    let buffer = seal_plaintext(source.as_slice())?;
    if config::zero_plaintext() {
        source.zero();
    }
    Ok(buffer)
}

struct State {
    mem: Option<LockedRegion>,
    has_mac: bool,
    destroyed: bool,
    /// Bumped on every re-arm and on destroy; a timer only fires when its
    /// generation is still current.
    timer_gen: u64,
}

struct Shared {
    state: Mutex<State>,
}

/// An encrypted secret pinned in memory.
///
/// Lifecycle: fresh → (timer armed, optionally) → destroyed. Destroyed is
/// terminal: everything except `destroy` then fails `UseAfterDestroy`, and
/// `destroy` itself stays a success. Callers serialize access to one buffer;
/// the internal mutex only arbitrates the race between an armed timer and an
/// explicit destroy. Dropping the buffer wipes the envelope through the
/// region's own teardown.
pub struct SecureBuffer {
    shared: Arc<Shared>,
}

impl SecureBuffer {
    fn from_parts(envelope: LockedRegion, has_mac: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    mem: Some(envelope),
                    has_mac,
                    destroyed: false,
                    timer_gen: 0,
                }),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Envelope length in bytes, 0 once destroyed.
    pub fn len(&self) -> usize {
        let state = self.lock_state();
        state.mem.as_ref().map_or(0, LockedRegion::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock_state().destroyed
    }

    /// Decrypts the envelope into a fresh locked region.
    ///
    /// The caller owns the wipe-and-release of the returned region
    /// (dropping it also wipes). The region's logical length is the
    /// plaintext length.
    pub fn decrypt(&self) -> Result<LockedRegion> {
        let state = self.lock_state();
        if state.destroyed {
            return Err(Error::UseAfterDestroy);
        }
        let mem = state.mem.as_ref().ok_or(Error::UseAfterDestroy)?;
        open_envelope(mem.as_slice(), state.has_mac)
    }

    /// Decrypts, hands `f` a read-only view of the plaintext, and wipes and
    /// releases the plaintext region on every exit path, including an error
    /// from `f` (a panic unwinds through the region's wiping drop).
    pub fn with_plaintext<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> Result<R>,
    {
        let mut plaintext = self.decrypt()?;
        let result = f(plaintext.as_slice());
        match (result, plaintext.free()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(e2)) => Err(e.combine(e2)),
        }
    }

    /// Arms a one-shot timer that destroys the buffer after `duration`.
    ///
    /// Re-arming cancels the previous timer. No-op once destroyed. The
    /// timer thread holds only a weak reference: if the owner drops the
    /// buffer first, the timer finds nothing and exits.
    pub fn destroy_after(&self, duration: Duration) {
        let my_gen;
        {
            let mut state = self.lock_state();
            if state.destroyed {
                return;
            }
            state.timer_gen += 1;
            my_gen = state.timer_gen;
        }

        let weak = Arc::downgrade(&self.shared);
        thread::spawn(move || {
            thread::sleep(duration);
            if let Some(shared) = weak.upgrade() {
                let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.destroyed || state.timer_gen != my_gen {
                    return;
                }
                if let Err(e) = destroy_state(&mut state) {
                    debug!("timed destroy reported: {}", e);
                }
            }
        });
        debug!("armed destroy timer for {:?}", duration);
    }

    /// Wipes the envelope and releases its region. Idempotent: repeat calls
    /// return success. Any armed timer is cancelled.
    ///
    /// When the envelope carries an integrity trailer and the master key is
    /// still bound, the trailer is recomputed first; a mismatch is reported
    /// but the wipe and release still proceed, and a release failure is
    /// reported alongside it.
    pub fn destroy(&self) -> Result<()> {
        let mut state = self.lock_state();
        destroy_state(&mut state)
    }
}

fn destroy_state(state: &mut State) -> Result<()> {
    if state.destroyed {
        return Ok(());
    }
    state.destroyed = true;
    state.timer_gen += 1;

    let mut integrity_err = None;
    if let Some(mem) = state.mem.as_ref() {
        // With the master key already shut down the trailer cannot be
        // recomputed; the wipe still proceeds.
        if state.has_mac && master::is_initialized() {
            match verify_envelope_mac(mem.as_slice()) {
                Ok(true) => {}
                Ok(false) => integrity_err = Some(Error::IntegrityFailed),
                Err(e) => integrity_err = Some(e),
            }
        }
    }

    let release_err = match state.mem.take() {
        Some(mut mem) => {
            mem.zero();
            mem.free().err()
        }
        None => None,
    };

    debug!("envelope destroyed");

    match (integrity_err, release_err) {
        (None, None) => Ok(()),
        (Some(e), None) => Err(e),
        (None, Some(e)) => Err(e),
        (Some(e1), Some(e2)) => Err(e1.combine(e2)),
    }
}

#[cfg(test)]
impl SecureBuffer {
    /// Test hook: mutate the raw envelope in place.
    pub(crate) fn tamper<F: FnOnce(&mut [u8])>(&self, f: F) {
        let mut state = self.lock_state();
        if let Some(mem) = state.mem.as_mut() {
            f(mem.as_mut_slice());
        }
    }

    /// Test hook: copy of the raw envelope bytes.
    pub(crate) fn envelope_copy(&self) -> Vec<u8> {
        let state = self.lock_state();
        state.mem.as_ref().map_or_else(Vec::new, |m| m.as_slice().to_vec())
    }
}
