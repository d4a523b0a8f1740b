//! # sealbox
//!
//! A library for holding short-lived secret material (passwords, tokens,
//! symmetric keys) in memory with three defensive properties:
//!
//! - **Pinned pages**: backing memory is allocated outside the managed heap
//!   and locked so the kernel cannot page it to swap.
//! - **Encrypted at rest in RAM**: each secret is stored as AES-256-GCM
//!   ciphertext under a per-buffer key derived from a process master key,
//!   with an optional HMAC-SHA256 integrity trailer.
//! - **Wipe before release**: every plaintext copy and every piece of
//!   derived key material, including transient cipher state, is overwritten
//!   before its storage is returned to the OS.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use sealbox::Result;
//!
//! fn main() -> Result<()> {
//!     let mut password = *b"correct horse battery staple";
//!     let buffer = sealbox::encrypt_to_memory(&mut password)?;
//!     // `password` has been wiped at this point.
//!
//!     buffer.with_plaintext(|plaintext| {
//!         // Use the secret here; the decrypted copy is wiped and
//!         // released as soon as this closure returns.
//!         assert_eq!(plaintext.len(), 28);
//!         Ok(())
//!     })?;
//!
//!     buffer.destroy()?;
//!     sealbox::shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Timed destruction
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! # fn demo() -> sealbox::Result<()> {
//! let mut token = *b"ephemeral";
//! let buffer = sealbox::encrypt_to_memory(&mut token)?;
//! buffer.destroy_after(Duration::from_secs(30));
//! # Ok(())
//! # }
//! ```
//!
//! Callers serialize access to any one buffer; the library only locks
//! internally where an armed destruction timer could race an explicit
//! `destroy`. There is no persisted state, no wire format and no logger
//! installation; the `log` facade is used for trace output only.

/// Secret envelope: encrypt, decrypt, scoped use, timed destruction
pub mod buffer;

/// Process-scoped behavior flags
pub mod config;

/// Transient AEAD and HMAC holders with locked working state
pub mod crypto;

/// Error types
pub mod error;

/// Master key lifecycle
pub mod master;

/// Locked memory regions
pub mod region;

mod util;

// Re-export key types and operations
pub use crate::buffer::{encrypt_locked, encrypt_to_memory, SecureBuffer};
pub use crate::config::{
    integrity_check, set_integrity_check, set_zero_plaintext, zero_plaintext,
};
pub use crate::crypto::{LockedAead, LockedHmac};
pub use crate::error::{Error, Result};
pub use crate::master::{init, shutdown, with_master_key, MasterKeyManager};
pub use crate::region::{allocate_locked, free_locked, zero_locked, LockedRegion};
pub use crate::util::{fill_random, zero};
