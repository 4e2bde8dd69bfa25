//! Key derivation with pluggable backends.
//!
//! This module provides:
//! - [`derive_key`]: derive bytes from input keying material and a salt
//! - [`KdfAlgorithm`]: HKDF (SHA-2), PBKDF2, Argon2id and BLAKE3 backends
//! - [`KdfParams`]: serialisable cost and output parameters
//!
//! Purpose binding is the caller's job: fold the purpose string into `input`
//! (the identifier model does `base_hash ‖ purpose`). Identical
//! `(input, salt, params)` always produce identical output.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use ring::{hkdf, pbkdf2};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{IdentityError, Result};
use crate::hash::{into_output, HashFlags};
use crate::memory::SecureBuffer;

/// Minimum salt length in bytes.
pub const MIN_SALT_LEN: usize = 16;

/// Smallest output the engine will produce.
pub const MIN_OUTPUT_LEN: usize = 16;

/// Largest output the engine will produce.
pub const MAX_OUTPUT_LEN: usize = 64;

/// Default output length (256 bits).
pub const DEFAULT_OUTPUT_LEN: usize = 32;

/// HKDF info string (domain separation from other HKDF users).
const HKDF_INFO: &[u8] = b"idseal-kdf-v1";

/// BLAKE3 derive-key context string.
const BLAKE3_KDF_CONTEXT: &str = "idseal 2024-06 key derivation";

/// PBKDF2 default iteration count (OWASP 2023, HMAC-SHA256).
const PBKDF2_DEFAULT_ITERATIONS: u32 = 600_000;

/// Argon2id defaults: 19 MiB, 2 passes, 1 lane (OWASP minimum).
const ARGON2_DEFAULT_MEMORY_KIB: u32 = 19_456;
const ARGON2_DEFAULT_ITERATIONS: u32 = 2;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Key derivation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KdfAlgorithm {
    /// HKDF extract-then-expand with HMAC-SHA256.
    HkdfSha256,
    /// HKDF with HMAC-SHA384.
    HkdfSha384,
    /// HKDF with HMAC-SHA512.
    HkdfSha512,
    /// PBKDF2-HMAC-SHA256, `iterations` rounds.
    Pbkdf2Sha256,
    /// Argon2id v1.3, memory-hard.
    Argon2id,
    /// BLAKE3 in derive-key mode with extendable output.
    Blake3,
}

const KDF_DISPATCH: [(&str, KdfAlgorithm); 6] = [
    ("hkdf-sha256", KdfAlgorithm::HkdfSha256),
    ("hkdf-sha384", KdfAlgorithm::HkdfSha384),
    ("hkdf-sha512", KdfAlgorithm::HkdfSha512),
    ("pbkdf2-sha256", KdfAlgorithm::Pbkdf2Sha256),
    ("argon2id", KdfAlgorithm::Argon2id),
    ("blake3", KdfAlgorithm::Blake3),
];

impl KdfAlgorithm {
    /// All supported backends.
    pub const ALL: [Self; 6] = [
        Self::HkdfSha256,
        Self::HkdfSha384,
        Self::HkdfSha512,
        Self::Pbkdf2Sha256,
        Self::Argon2id,
        Self::Blake3,
    ];

    /// Resolve a backend by name (case-insensitive, `_` accepted for `-`).
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::UnsupportedAlgorithm` for unknown names.
    pub fn from_name(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        KDF_DISPATCH
            .iter()
            .find(|(n, _)| *n == normalized)
            .map(|(_, alg)| *alg)
            .ok_or_else(|| IdentityError::UnsupportedAlgorithm(name.to_owned()))
    }

    /// Canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::HkdfSha256 => "hkdf-sha256",
            Self::HkdfSha384 => "hkdf-sha384",
            Self::HkdfSha512 => "hkdf-sha512",
            Self::Pbkdf2Sha256 => "pbkdf2-sha256",
            Self::Argon2id => "argon2id",
            Self::Blake3 => "blake3",
        }
    }

    fn hkdf_algorithm(self) -> Option<hkdf::Algorithm> {
        match self {
            Self::HkdfSha256 => Some(hkdf::HKDF_SHA256),
            Self::HkdfSha384 => Some(hkdf::HKDF_SHA384),
            Self::HkdfSha512 => Some(hkdf::HKDF_SHA512),
            _ => None,
        }
    }
}

impl FromStr for KdfAlgorithm {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// KDF parameter set.
///
/// Fields unused by a backend are ignored by it:
/// - `iterations`: PBKDF2 rounds, Argon2id passes (`t_cost`)
/// - `memory_kib`: Argon2id memory in KiB (`m_cost`)
/// - `parallelism`: Argon2id lanes (`p_cost`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Output length in bytes, `[MIN_OUTPUT_LEN, MAX_OUTPUT_LEN]`.
    pub output_len: usize,
    /// Iteration / pass count.
    pub iterations: u32,
    /// Memory cost in kibibytes.
    pub memory_kib: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Default parameters for `algorithm`.
    #[must_use]
    pub const fn for_algorithm(algorithm: KdfAlgorithm) -> Self {
        let (iterations, memory_kib) = match algorithm {
            KdfAlgorithm::Pbkdf2Sha256 => (PBKDF2_DEFAULT_ITERATIONS, 0),
            KdfAlgorithm::Argon2id => (ARGON2_DEFAULT_ITERATIONS, ARGON2_DEFAULT_MEMORY_KIB),
            _ => (1, 0),
        };
        Self {
            output_len: DEFAULT_OUTPUT_LEN,
            iterations,
            memory_kib,
            parallelism: 1,
        }
    }

    /// Same parameters with a different output length.
    #[must_use]
    pub const fn with_output_len(mut self, output_len: usize) -> Self {
        self.output_len = output_len;
        self
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::for_algorithm(KdfAlgorithm::HkdfSha256)
    }
}

// ---------------------------------------------------------------------------
// Core KDF
// ---------------------------------------------------------------------------

/// `ring` HKDF output-length type.
struct OutputLen(usize);

impl hkdf::KeyType for OutputLen {
    fn len(&self) -> usize {
        self.0
    }
}

/// Derive key material from `input` and `salt`.
///
/// `params` defaults to [`KdfParams::for_algorithm`]. The output is placed in
/// a tagged secure buffer when `flags` contains [`HashFlags::SECURE`].
///
/// # Errors
///
/// - `IdentityError::InvalidArgument` if the salt is shorter than 16 bytes,
///   the output length is outside `[16, 64]`, or backend cost parameters are
///   invalid
/// - `IdentityError::CryptoFailure` if the backend itself fails
pub fn derive_key(
    algorithm: KdfAlgorithm,
    input: &[u8],
    salt: &[u8],
    params: Option<&KdfParams>,
    flags: HashFlags,
) -> Result<SecureBuffer> {
    let params = params.copied().unwrap_or_else(|| KdfParams::for_algorithm(algorithm));

    if salt.len() < MIN_SALT_LEN {
        return Err(IdentityError::InvalidArgument(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }
    if !(MIN_OUTPUT_LEN..=MAX_OUTPUT_LEN).contains(&params.output_len) {
        return Err(IdentityError::InvalidArgument(format!(
            "output length {} outside [{MIN_OUTPUT_LEN}, {MAX_OUTPUT_LEN}]",
            params.output_len
        )));
    }

    let mut output = Zeroizing::new(vec![0u8; params.output_len]);
    match algorithm {
        KdfAlgorithm::HkdfSha256 | KdfAlgorithm::HkdfSha384 | KdfAlgorithm::HkdfSha512 => {
            let alg = algorithm.hkdf_algorithm().ok_or_else(|| {
                IdentityError::UnsupportedAlgorithm(algorithm.name().to_owned())
            })?;
            hkdf_into(alg, input, salt, &mut output)?;
        }
        KdfAlgorithm::Pbkdf2Sha256 => {
            let rounds = NonZeroU32::new(params.iterations).ok_or_else(|| {
                IdentityError::InvalidArgument("PBKDF2 iterations must be > 0".into())
            })?;
            pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, rounds, salt, input, &mut output);
        }
        KdfAlgorithm::Argon2id => argon2id_into(input, salt, &params, &mut output)?,
        KdfAlgorithm::Blake3 => {
            let salt_len = u64::try_from(salt.len())
                .map_err(|_| IdentityError::InvalidArgument("salt too long".into()))?;
            let mut hasher = blake3::Hasher::new_derive_key(BLAKE3_KDF_CONTEXT);
            hasher.update(&salt_len.to_le_bytes());
            hasher.update(salt);
            hasher.update(input);
            hasher.finalize_xof().fill(&mut output);
        }
    }

    into_output(std::mem::take(&mut *output), flags)
}

fn hkdf_into(alg: hkdf::Algorithm, input: &[u8], salt: &[u8], out: &mut [u8]) -> Result<()> {
    let prk = hkdf::Salt::new(alg, salt).extract(input);
    let okm = prk
        .expand(&[HKDF_INFO], OutputLen(out.len()))
        .map_err(|_| IdentityError::CryptoFailure("HKDF expand failed".into()))?;
    okm.fill(out)
        .map_err(|_| IdentityError::CryptoFailure("HKDF fill failed".into()))
}

fn argon2id_into(input: &[u8], salt: &[u8], params: &KdfParams, out: &mut [u8]) -> Result<()> {
    let argon2_params = argon2::Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(out.len()),
    )
    .map_err(|e| IdentityError::InvalidArgument(format!("invalid argon2 params: {e}")))?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    argon2
        .hash_password_into(input, salt, out)
        .map_err(|e| IdentityError::CryptoFailure(format!("argon2id derivation failed: {e}")))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
