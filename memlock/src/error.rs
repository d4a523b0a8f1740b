use thiserror::Error;

/// Errors that can occur during memory-related operations.
#[derive(Error, Debug)]
pub enum MemlockError {
    /// A zero-length allocation was requested.
    #[error("invalid allocation size")]
    InvalidSize,

    /// The anonymous mapping could not be created.
    #[error("mmap failed: {0}")]
    Mmap(String),

    /// The pages could not be pinned in RAM, even after falling back from
    /// the on-fault variant.
    #[error("mlock failed: {0}")]
    Lock(String),

    /// The pages could not be unpinned.
    #[error("munlock failed: {0}")]
    Unlock(String),

    /// The mapping could not be released.
    #[error("munmap failed: {0}")]
    Unmap(String),

    /// A resource limit could not be applied.
    #[error("setrlimit failed: {0}")]
    Rlimit(String),
}
