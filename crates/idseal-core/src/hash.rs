//! Hash and HMAC engine.
//!
//! Algorithms are a closed enum resolved once through [`HashAlgorithm::from_name`];
//! an unknown name fails there, never in the middle of a hashing call.
//! SHA-2 goes through `ring`, BLAKE3 through the `blake3` crate.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use ring::{digest, hmac};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::encoding::Encoding;
use crate::error::{IdentityError, Result};
use crate::memory::{self, SecureBuffer};

/// BLAKE3 derive-key context used to turn an arbitrary HMAC key into the
/// 32-byte key `blake3::keyed_hash` requires.
const BLAKE3_MAC_CONTEXT: &str = "idseal 2024-06 blake3 mac key";

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

/// Supported hash algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256, 32-byte output.
    Sha256,
    /// SHA-384, 48-byte output.
    Sha384,
    /// SHA-512, 64-byte output.
    Sha512,
    /// BLAKE3, 32-byte output.
    Blake3,
}

struct AlgorithmEntry {
    name: &'static str,
    algorithm: HashAlgorithm,
    output_len: usize,
}

/// Name → algorithm → output size. The first entry for a given size is the
/// one [`HashAlgorithm::for_output_len`] picks.
static DISPATCH: [AlgorithmEntry; 4] = [
    AlgorithmEntry {
        name: "sha256",
        algorithm: HashAlgorithm::Sha256,
        output_len: 32,
    },
    AlgorithmEntry {
        name: "sha384",
        algorithm: HashAlgorithm::Sha384,
        output_len: 48,
    },
    AlgorithmEntry {
        name: "sha512",
        algorithm: HashAlgorithm::Sha512,
        output_len: 64,
    },
    AlgorithmEntry {
        name: "blake3",
        algorithm: HashAlgorithm::Blake3,
        output_len: 32,
    },
];

impl HashAlgorithm {
    /// All supported algorithms, in dispatch-table order.
    pub const ALL: [Self; 4] = [Self::Sha256, Self::Sha384, Self::Sha512, Self::Blake3];

    fn entry(self) -> &'static AlgorithmEntry {
        match self {
            Self::Sha256 => &DISPATCH[0],
            Self::Sha384 => &DISPATCH[1],
            Self::Sha512 => &DISPATCH[2],
            Self::Blake3 => &DISPATCH[3],
        }
    }

    /// Resolve an algorithm by name (case-insensitive, `-`/`_` ignored).
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::UnsupportedAlgorithm` for unknown names.
    pub fn from_name(name: &str) -> Result<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        DISPATCH
            .iter()
            .find(|entry| entry.name == normalized)
            .map(|entry| entry.algorithm)
            .ok_or_else(|| IdentityError::UnsupportedAlgorithm(name.to_owned()))
    }

    /// Canonical lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.entry().name
    }

    /// Digest length in bytes.
    #[must_use]
    pub fn output_len(self) -> usize {
        self.entry().output_len
    }

    /// Preferred algorithm producing `len`-byte digests, if any.
    #[must_use]
    pub fn for_output_len(len: usize) -> Option<Self> {
        DISPATCH
            .iter()
            .find(|entry| entry.output_len == len)
            .map(|entry| entry.algorithm)
    }

    fn ring_digest(self) -> Option<&'static digest::Algorithm> {
        match self {
            Self::Sha256 => Some(&digest::SHA256),
            Self::Sha384 => Some(&digest::SHA384),
            Self::Sha512 => Some(&digest::SHA512),
            Self::Blake3 => None,
        }
    }

    fn ring_hmac(self) -> Option<hmac::Algorithm> {
        match self {
            Self::Sha256 => Some(hmac::HMAC_SHA256),
            Self::Sha384 => Some(hmac::HMAC_SHA384),
            Self::Sha512 => Some(hmac::HMAC_SHA512),
            Self::Blake3 => None,
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Output flags for hashing and key derivation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HashFlags(u32);

impl HashFlags {
    /// Untagged output.
    pub const NONE: Self = Self(0);
    /// Place the output in a tagged, canary-guarded secure buffer.
    pub const SECURE: Self = Self(1);

    /// Returns `true` if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for HashFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Move `bytes` into a buffer tagged according to `flags`, zeroizing the source.
pub(crate) fn into_output(mut bytes: Vec<u8>, flags: HashFlags) -> Result<SecureBuffer> {
    if flags.contains(HashFlags::SECURE) {
        let result = SecureBuffer::from_slice(&bytes);
        bytes.zeroize();
        result
    } else {
        Ok(SecureBuffer::wrap(bytes))
    }
}

// ---------------------------------------------------------------------------
// Incremental hashing
// ---------------------------------------------------------------------------

enum HashState {
    Ring(digest::Context),
    Blake3(Box<blake3::Hasher>),
    Finalized,
}

/// Incremental hashing context.
///
/// Once [`digest`](Self::digest) has been taken the context is terminal:
/// further `update` or `digest` calls return `InvalidState`.
pub struct HashContext {
    algorithm: HashAlgorithm,
    state: HashState,
}

impl HashContext {
    /// Start a new hash computation.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm.ring_digest() {
            Some(alg) => HashState::Ring(digest::Context::new(alg)),
            None => HashState::Blake3(Box::new(blake3::Hasher::new())),
        };
        Self { algorithm, state }
    }

    /// Algorithm this context was created with.
    #[must_use]
    pub const fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Returns `true` once the digest has been taken.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        matches!(self.state, HashState::Finalized)
    }

    /// Feed more input.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidState` after finalisation.
    pub fn update(&mut self, chunk: impl AsRef<[u8]>) -> Result<()> {
        match &mut self.state {
            HashState::Ring(ctx) => ctx.update(chunk.as_ref()),
            HashState::Blake3(hasher) => {
                hasher.update(chunk.as_ref());
            }
            HashState::Finalized => {
                return Err(IdentityError::InvalidState(
                    "hash context already finalized".into(),
                ))
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        match std::mem::replace(&mut self.state, HashState::Finalized) {
            HashState::Ring(ctx) => Ok(ctx.finish().as_ref().to_vec()),
            HashState::Blake3(hasher) => Ok(hasher.finalize().as_bytes().to_vec()),
            HashState::Finalized => Err(IdentityError::InvalidState(
                "hash context already finalized".into(),
            )),
        }
    }

    /// Finalise and return the raw digest in a tagged secure buffer.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidState` if already finalised.
    pub fn digest(&mut self) -> Result<SecureBuffer> {
        let bytes = self.finish()?;
        into_output(bytes, HashFlags::SECURE)
    }

    /// Finalise and return the digest as text.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidState` if already finalised.
    pub fn digest_encoded(&mut self, encoding: Encoding) -> Result<String> {
        let mut bytes = self.finish()?;
        let text = encoding.encode(&bytes);
        bytes.zeroize();
        Ok(text)
    }
}

impl fmt::Debug for HashContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashContext")
            .field("algorithm", &self.algorithm)
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// One-shot helpers
// ---------------------------------------------------------------------------

/// Hash `data` in one call.
///
/// `&str`, `String`, `&[u8]` and `Vec<u8>` inputs with the same bytes give
/// byte-identical digests.
///
/// # Errors
///
/// Returns `IdentityError::CryptoFailure` only if a secure output buffer
/// cannot be set up.
pub fn hash(
    algorithm: HashAlgorithm,
    data: impl AsRef<[u8]>,
    flags: HashFlags,
) -> Result<SecureBuffer> {
    hash_parts(algorithm, &[data.as_ref()], flags)
}

/// Hash the concatenation of `parts`.
///
/// # Errors
///
/// See [`hash`].
pub fn hash_parts(
    algorithm: HashAlgorithm,
    parts: &[&[u8]],
    flags: HashFlags,
) -> Result<SecureBuffer> {
    let mut ctx = HashContext::new(algorithm);
    for part in parts {
        ctx.update(part)?;
    }
    let bytes = ctx.finish()?;
    into_output(bytes, flags)
}

/// HMAC of `data` under `key`.
///
/// # Errors
///
/// See [`hash`].
pub fn hmac(algorithm: HashAlgorithm, key: &[u8], data: impl AsRef<[u8]>) -> Result<SecureBuffer> {
    hmac_parts(algorithm, key, &[data.as_ref()])
}

/// HMAC of the concatenation of `parts` under `key`. Output is tagged secure.
///
/// # Errors
///
/// See [`hash`].
pub fn hmac_parts(algorithm: HashAlgorithm, key: &[u8], parts: &[&[u8]]) -> Result<SecureBuffer> {
    let bytes = if let Some(alg) = algorithm.ring_hmac() {
        let key = hmac::Key::new(alg, key);
        let mut ctx = hmac::Context::with_key(&key);
        for part in parts {
            ctx.update(part);
        }
        ctx.sign().as_ref().to_vec()
    } else {
        let mut mac_key = blake3::derive_key(BLAKE3_MAC_CONTEXT, key);
        let mut hasher = blake3::Hasher::new_keyed(&mac_key);
        mac_key.zeroize();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().as_bytes().to_vec()
    };
    into_output(bytes, HashFlags::SECURE)
}

/// Constant-time digest comparison.
#[must_use]
pub fn verify_hash(a: &[u8], b: &[u8]) -> bool {
    memory::ct_eq(a, b)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
