//! Error types for `idseal-core`.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = IdentityError> = std::result::Result<T, E>;

/// Errors produced by identity, key and proof operations.
///
/// Semantic verification failures (wrong data, wrong challenge, expired key)
/// are never reported through this type: verification functions return
/// `false` for those. Errors are reserved for malformed requests, lifecycle
/// misuse and primitive failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Malformed caller input. Never caused by cryptographic material itself.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Parsing or encoding violation (canonical strings, configuration).
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Requested buffer size is zero or above the allocation ceiling.
    #[error("invalid size: {0}")]
    InvalidSize(String),

    /// A buffer did not have the length the caller expected.
    #[error("size mismatch: expected {expected} bytes, found {actual}")]
    SizeMismatch {
        /// Length the caller asserted.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// Offset or length outside buffer bounds.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Underlying primitive failure (CSPRNG, HKDF expand, Argon2).
    #[error("cryptographic failure: {0}")]
    CryptoFailure(String),

    /// A verification request that cannot be evaluated at all.
    ///
    /// Ordinary mismatches are `Ok(false)`, not this error.
    #[error("verification request rejected: {0}")]
    VerificationFailed(String),

    /// Operation attempted on a disposed context.
    #[error("not initialized: {0}")]
    NotInitialized(String),

    /// Lifecycle misuse: double free, update after finalize, counter underflow.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Unknown hash or KDF algorithm name.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Canary or integrity violation on a secure allocation.
    #[error("tampering detected: {0}")]
    TamperingDetected(String),

    /// Operation refused outside a non-production build.
    #[error("insecure operation refused: {0}")]
    InsecureOperation(String),
}

/// Discriminant of [`IdentityError`], for matching without the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidFormat,
    InvalidSize,
    SizeMismatch,
    OutOfRange,
    CryptoFailure,
    VerificationFailed,
    NotInitialized,
    InvalidState,
    UnsupportedAlgorithm,
    TamperingDetected,
    InsecureOperation,
}

impl IdentityError {
    /// Return the payload-free kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InvalidFormat(_) => ErrorKind::InvalidFormat,
            Self::InvalidSize(_) => ErrorKind::InvalidSize,
            Self::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Self::OutOfRange(_) => ErrorKind::OutOfRange,
            Self::CryptoFailure(_) => ErrorKind::CryptoFailure,
            Self::VerificationFailed(_) => ErrorKind::VerificationFailed,
            Self::NotInitialized(_) => ErrorKind::NotInitialized,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            Self::TamperingDetected(_) => ErrorKind::TamperingDetected,
            Self::InsecureOperation(_) => ErrorKind::InsecureOperation,
        }
    }
}
