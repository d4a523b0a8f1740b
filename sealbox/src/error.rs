use memlock::MemlockError;
use thiserror::Error;

/// Errors that can occur in the sealbox library.
///
/// Every fallible operation returns one of these. Failure paths release any
/// resource they acquired before returning, and wiping always precedes
/// release; a release failure never prevents the wipe.
#[derive(Error, Debug)]
pub enum Error {
    /// A zero-length locked allocation was requested.
    #[error("invalid allocation size")]
    InvalidSize,

    /// A cleared or absent plaintext region was supplied.
    #[error("invalid input region")]
    InvalidInput,

    /// The anonymous mapping could not be created.
    #[error("mmap failed: {0}")]
    Mmap(String),

    /// The pages could not be pinned in RAM, even after the on-fault
    /// fallback.
    #[error("memory lock failed: {0}")]
    Lock(String),

    /// The pages could not be unpinned during release.
    #[error("memory unlock failed: {0}")]
    Unlock(String),

    /// The mapping could not be released.
    #[error("memory unmap failed: {0}")]
    Unmap(String),

    /// The CSPRNG failed or returned short.
    #[error("random source failed: {0}")]
    Random(String),

    /// Cipher construction or an underlying seal/open failure.
    #[error("aead failure: {0}")]
    Aead(String),

    /// The AEAD rejected the ciphertext or tag.
    #[error("decryption failed")]
    Decrypt,

    /// The envelope's HMAC trailer did not match.
    #[error("integrity check failed")]
    IntegrityFailed,

    /// An operation was attempted on a destroyed buffer.
    #[error("buffer destroyed")]
    UseAfterDestroy,

    /// An operation required the master key but none is bound.
    #[error("master key not initialized")]
    Uninitialized,

    /// Two independent failures on the same path, e.g. an integrity
    /// mismatch and a release error found by the same destroy.
    #[error("{0}; {1}")]
    Combined(Box<Error>, Box<Error>),
}

impl From<MemlockError> for Error {
    fn from(err: MemlockError) -> Self {
        match err {
            MemlockError::InvalidSize => Error::InvalidSize,
            MemlockError::Mmap(msg) => Error::Mmap(msg),
            MemlockError::Lock(msg) => Error::Lock(msg),
            MemlockError::Unlock(msg) => Error::Unlock(msg),
            MemlockError::Unmap(msg) => Error::Unmap(msg),
            MemlockError::Rlimit(msg) => Error::Lock(msg),
        }
    }
}

impl Error {
    /// Folds a second error into `self`, preserving both.
    pub(crate) fn combine(self, other: Error) -> Error {
        Error::Combined(Box::new(self), Box::new(other))
    }
}

/// Result type for sealbox operations.
pub type Result<T> = std::result::Result<T, Error>;
