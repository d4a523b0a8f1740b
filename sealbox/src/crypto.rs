//! Transient cryptographic state pinned in locked memory.
//!
//! Standard cipher and MAC constructors leave their key schedules wherever
//! the caller's value happens to live. The holders here move that state into
//! a [`LockedRegion`] immediately after construction and wipe the stack copy
//! the move leaves behind, so the wipe-before-release discipline covers the
//! working state and not just the inputs. This is best-effort: the upstream
//! constructor may have made transient copies the holder cannot reach.

use crate::error::{Error, Result};
use crate::region::LockedRegion;
use crate::util;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce, Tag};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ptr;

/// AES-GCM nonce length in bytes.
pub const GCM_NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length in bytes.
pub const GCM_TAG_LEN: usize = 16;
/// HMAC-SHA256 output length in bytes.
pub const HMAC_OUTPUT_LEN: usize = 32;
/// SHA-256 block length in bytes.
pub const HMAC_BLOCK_LEN: usize = 64;

type HmacSha256 = Hmac<Sha256>;

/// A value moved into its own locked pages.
///
/// The value is bitwise-copied into a fresh [`LockedRegion`] and the source
/// bytes are wiped, so the only live copy of the state sits in pinned
/// memory. `T` must be plain cipher state: no heap indirection and no
/// destructor, which holds for the block-cipher and digest types used here
/// (their state is fixed-size arrays). The region's drop wipes the state
/// even when `destroy` is never called.
struct LockedCell<T> {
    region: LockedRegion,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for LockedCell<T> {}

impl<T> LockedCell<T> {
    fn new(value: T) -> Result<Self> {
        let size = mem::size_of::<T>();
        let mut region = LockedRegion::allocate(size.max(1))?;

        let mut value = ManuallyDrop::new(value);
        unsafe {
            ptr::copy_nonoverlapping(
                (&*value as *const T).cast::<u8>(),
                region.as_mut_slice().as_mut_ptr(),
                size,
            );
            let stack =
                std::slice::from_raw_parts_mut((&mut *value as *mut T).cast::<u8>(), size);
            util::zero(stack);
        }

        Ok(Self {
            region,
            _marker: PhantomData,
        })
    }

    fn get(&self) -> &T {
        // The mapping is page-aligned, which satisfies any T.
        unsafe { &*self.region.as_slice().as_ptr().cast::<T>() }
    }

    fn get_mut(&mut self) -> &mut T {
        unsafe { &mut *self.region.as_mut_slice().as_mut_ptr().cast::<T>() }
    }

    fn destroy(mut self) -> Result<()> {
        self.region.free()
    }
}

/// AES-256-GCM whose cipher state lives in locked memory.
pub struct LockedAead {
    cipher: LockedCell<Aes256Gcm>,
}

impl LockedAead {
    /// Builds the cipher over a 32-byte key and moves its key schedule into
    /// locked pages.
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::Aead(format!("cipher construction failed: {}", e)))?;
        Ok(Self {
            cipher: LockedCell::new(cipher)?,
        })
    }

    /// Bytes added to a plaintext by `seal`.
    pub fn overhead(&self) -> usize {
        GCM_TAG_LEN
    }

    /// Nonce length expected by `seal` and `open`.
    pub fn nonce_size(&self) -> usize {
        GCM_NONCE_LEN
    }

    /// Encrypts `plaintext` into `out`, which must be exactly
    /// `plaintext.len() + overhead()` bytes. The tag is appended.
    pub fn seal(&self, out: &mut [u8], nonce: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<()> {
        if out.len() != plaintext.len() + GCM_TAG_LEN {
            return Err(Error::Aead("seal output length mismatch".to_string()));
        }

        let (body, tag_dst) = out.split_at_mut(plaintext.len());
        body.copy_from_slice(plaintext);

        let tag = self
            .cipher
            .get()
            .encrypt_in_place_detached(Nonce::from_slice(nonce), aad, body)
            .map_err(|e| Error::Aead(format!("seal failed: {}", e)))?;
        tag_dst.copy_from_slice(tag.as_slice());

        Ok(())
    }

    /// Decrypts `ciphertext` (tag included) into `out` and returns the
    /// plaintext length. On rejection the output slice is wiped before
    /// `Decrypt` is returned.
    pub fn open(
        &self,
        out: &mut [u8],
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<usize> {
        if ciphertext.len() < GCM_TAG_LEN {
            return Err(Error::Decrypt);
        }
        let body_len = ciphertext.len() - GCM_TAG_LEN;
        if out.len() < body_len {
            return Err(Error::Aead("open output too short".to_string()));
        }

        let (body_src, tag) = ciphertext.split_at(body_len);
        out[..body_len].copy_from_slice(body_src);

        match self.cipher.get().decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            aad,
            &mut out[..body_len],
            Tag::from_slice(tag),
        ) {
            Ok(()) => Ok(body_len),
            Err(_) => {
                util::zero(out);
                Err(Error::Decrypt)
            }
        }
    }

    /// Wipes the cipher state and releases its pages. The wipe completes
    /// even when the release errors.
    pub fn destroy(self) -> Result<()> {
        self.cipher.destroy()
    }
}

/// HMAC-SHA256 whose digest states and key pads live in locked memory.
pub struct LockedHmac {
    mac: LockedCell<HmacSha256>,
}

impl LockedHmac {
    pub fn new(key: &[u8]) -> Result<Self> {
        let mac = <HmacSha256 as Mac>::new_from_slice(key)
            .map_err(|e| Error::Aead(format!("hmac construction failed: {}", e)))?;
        Ok(Self {
            mac: LockedCell::new(mac)?,
        })
    }

    pub fn update(&mut self, data: &[u8]) {
        self.mac.get_mut().update(data);
    }

    /// Writes the 32-byte tag into `dst` and resets the state for reuse.
    /// The transient output block is wiped after the copy.
    pub fn finalize_into(&mut self, dst: &mut [u8]) {
        let mut out = self.mac.get_mut().finalize_reset().into_bytes();
        dst[..HMAC_OUTPUT_LEN].copy_from_slice(out.as_slice());
        util::zero(out.as_mut_slice());
    }

    pub fn reset(&mut self) {
        self.mac.get_mut().reset();
    }

    pub fn output_size(&self) -> usize {
        HMAC_OUTPUT_LEN
    }

    pub fn block_size(&self) -> usize {
        HMAC_BLOCK_LEN
    }

    /// Wipes the MAC state and releases its pages.
    pub fn destroy(self) -> Result<()> {
        self.mac.destroy()
    }
}
