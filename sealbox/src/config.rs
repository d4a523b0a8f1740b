//! Process-scoped behavior flags.

use std::sync::atomic::{AtomicBool, Ordering};

static ZERO_PLAINTEXT: AtomicBool = AtomicBool::new(false);
static INTEGRITY_CHECK: AtomicBool = AtomicBool::new(true);

/// When set, `encrypt_locked` zeroizes the caller's source region after a
/// successful encrypt. The byte-slice path (`encrypt_to_memory`) always
/// wipes its input regardless of this flag.
pub fn set_zero_plaintext(enabled: bool) {
    ZERO_PLAINTEXT.store(enabled, Ordering::Relaxed);
}

pub fn zero_plaintext() -> bool {
    ZERO_PLAINTEXT.load(Ordering::Relaxed)
}

/// When set (the default), envelopes carry an HMAC-SHA256 trailer over
/// nonce ‖ ciphertext and both decrypt and destroy verify it.
pub fn set_integrity_check(enabled: bool) {
    INTEGRITY_CHECK.store(enabled, Ordering::Relaxed);
}

pub fn integrity_check() -> bool {
    INTEGRITY_CHECK.load(Ordering::Relaxed)
}
