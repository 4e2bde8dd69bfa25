//! Salt generation and sanity checking.
//!
//! Salts always contain fresh system entropy. Caller-supplied entropy can be
//! mixed in, never substituted. [`generate_deterministic`] exists only for
//! reproducible tests and refuses to run in production builds.

use std::ops::BitOr;

use crate::error::{IdentityError, Result};
use crate::memory::{self, SecureBuffer};

/// Minimum salt length in bytes.
pub const MIN_SALT_LEN: usize = 16;

/// Maximum salt length in bytes.
pub const MAX_SALT_LEN: usize = 64;

/// Default salt length in bytes.
pub const DEFAULT_SALT_LEN: usize = 32;

/// Draws attempted under [`SaltFlags::REQUIRE_QUALITY`] before giving up.
const QUALITY_RETRIES: usize = 8;

/// BLAKE3 derive-key context for mixing custom entropy into system entropy.
const MIX_CONTEXT: &str = "idseal 2024-06 salt entropy mix";

/// BLAKE3 derive-key context for test-only deterministic salts.
const DETERMINISTIC_CONTEXT: &str = "idseal 2024-06 deterministic test salt";

/// Deterministic salts are available to unit tests and to builds that opt in
/// through the `insecure-deterministic` feature, nowhere else.
const DETERMINISTIC_ALLOWED: bool = cfg!(any(test, feature = "insecure-deterministic"));

/// Salt generation flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaltFlags(u32);

impl SaltFlags {
    /// No extra behaviour.
    pub const NONE: Self = Self(0);
    /// Re-draw until the salt passes [`verify`].
    pub const REQUIRE_QUALITY: Self = Self(1);

    /// Returns `true` if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SaltFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

fn check_length(length: usize) -> Result<()> {
    if !(MIN_SALT_LEN..=MAX_SALT_LEN).contains(&length) {
        return Err(IdentityError::InvalidArgument(format!(
            "salt length {length} outside [{MIN_SALT_LEN}, {MAX_SALT_LEN}]"
        )));
    }
    Ok(())
}

/// Generate a `length`-byte salt.
///
/// When `custom_entropy` is supplied, its first `entropy_size` bytes are
/// mixed with an equal-length draw of system entropy through BLAKE3.
///
/// # Errors
///
/// - `IdentityError::InvalidArgument` if `length ∉ [16, 64]`, if only one of
///   `custom_entropy`/`entropy_size` is given, or if `entropy_size` exceeds
///   the entropy buffer
/// - `IdentityError::CryptoFailure` if the CSPRNG fails, or if
///   `REQUIRE_QUALITY` cannot be met within the retry budget
pub fn generate(
    length: usize,
    flags: SaltFlags,
    custom_entropy: Option<&[u8]>,
    entropy_size: Option<usize>,
) -> Result<SecureBuffer> {
    check_length(length)?;
    let custom = match (custom_entropy, entropy_size) {
        (None, None) => None,
        (Some(_), None) => {
            return Err(IdentityError::InvalidArgument(
                "custom entropy given without entropy size".into(),
            ))
        }
        (None, Some(_)) => {
            return Err(IdentityError::InvalidArgument(
                "entropy size given without custom entropy".into(),
            ))
        }
        (Some(entropy), Some(size)) => {
            let used = entropy.get(..size).ok_or_else(|| {
                IdentityError::InvalidArgument(format!(
                    "entropy size {size} exceeds {} supplied bytes",
                    entropy.len()
                ))
            })?;
            Some(used)
        }
    };

    let attempts = if flags.contains(SaltFlags::REQUIRE_QUALITY) {
        QUALITY_RETRIES
    } else {
        1
    };
    for _ in 0..attempts {
        let salt = draw(length, custom)?;
        if attempts == 1 || verify(Some(salt.expose()), MIN_SALT_LEN) {
            return Ok(salt);
        }
        tracing::debug!(length, "salt failed quality check, redrawing");
    }
    Err(IdentityError::CryptoFailure(format!(
        "no acceptable salt after {QUALITY_RETRIES} draws"
    )))
}

fn draw(length: usize, custom: Option<&[u8]>) -> Result<SecureBuffer> {
    let mut salt = memory::random_bytes(length)?;
    if let Some(custom) = custom {
        let mut hasher = blake3::Hasher::new_derive_key(MIX_CONTEXT);
        hasher.update(salt.expose());
        hasher.update(custom);
        hasher.finalize_xof().fill(salt.expose_mut());
    }
    Ok(salt)
}

/// Derive a salt from `seed` with no randomness.
///
/// `length` defaults to [`DEFAULT_SALT_LEN`].
///
/// # Errors
///
/// - `IdentityError::InsecureOperation` in production builds
/// - `IdentityError::InvalidArgument` for an empty seed or a bad length
pub fn generate_deterministic(seed: &[u8], length: Option<usize>) -> Result<SecureBuffer> {
    if !DETERMINISTIC_ALLOWED {
        return Err(IdentityError::InsecureOperation(
            "deterministic salts are only available in test builds".into(),
        ));
    }
    let length = length.unwrap_or(DEFAULT_SALT_LEN);
    check_length(length)?;
    if seed.is_empty() {
        return Err(IdentityError::InvalidArgument("seed must not be empty".into()));
    }
    tracing::warn!(length, "generating deterministic salt");

    let mut salt = memory::allocate(length)?;
    let mut hasher = blake3::Hasher::new_derive_key(DETERMINISTIC_CONTEXT);
    hasher.update(seed);
    hasher.finalize_xof().fill(salt.expose_mut());
    Ok(salt)
}

/// Basic sanity check on salt bytes.
///
/// Returns `false` for `None`, for salts shorter than `min_length`, and for
/// salts where a single byte value makes up more than a quarter of the bytes.
/// This catches degenerate input (constant fill, short repeating patterns);
/// it says nothing about cryptographic randomness.
#[must_use]
pub fn verify(salt: Option<&[u8]>, min_length: usize) -> bool {
    let Some(salt) = salt else {
        return false;
    };
    if salt.is_empty() || salt.len() < min_length {
        return false;
    }
    let mut counts = [0usize; 256];
    for &b in salt {
        let slot = &mut counts[usize::from(b)];
        *slot = slot.saturating_add(1);
    }
    let most_common = counts.iter().copied().max().unwrap_or(0);
    most_common.saturating_mul(4) <= salt.len()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
