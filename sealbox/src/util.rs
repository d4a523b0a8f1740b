use crate::error::{Error, Result};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Securely wipes a byte slice by overwriting it with zeros.
///
/// Built on `zeroize` so the overwrite survives optimization even when the
/// slice is never read again. No-op on an empty slice.
pub fn zero(bytes: &mut [u8]) {
    bytes.zeroize();
}

/// Fills a byte slice with cryptographically secure random bytes.
///
/// An empty slice is a success no-op. The platform source either fills the
/// whole slice or errors; a short read is never silently accepted.
pub fn fill_random(bytes: &mut [u8]) -> Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    getrandom::getrandom(bytes).map_err(|e| Error::Random(e.to_string()))
}

/// Compares two byte slices in constant time.
///
/// Slices of unequal length compare unequal; the length check itself is not
/// secret here (envelope field lengths are fixed and public).
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
