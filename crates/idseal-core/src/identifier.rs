//! Salted identifiers derived from structured caller data.
//!
//! An identifier is `H(domain ‖ salt ‖ normalize(data))` under the context's
//! hash algorithm. It is immutable once created and has a two-state
//! lifecycle: live, then freed. [`free`] wipes the hash and salt and
//! releases them through the context; dropping without `free` still zeroes
//! the bytes but leaves the context's counters untouched.
//!
//! Canonical text form: `version<sep>base64(hash)<sep>hex(salt)`.

use std::fmt;

use zeroize::Zeroizing;

use crate::context::IdentityContext;
use crate::data::IdentityData;
use crate::encoding::{decode_base64, decode_hex, encode_base64, encode_hex};
use crate::error::{IdentityError, Result};
use crate::hash::{self, HashAlgorithm, HashFlags};
use crate::kdf::{self, KdfAlgorithm, KdfParams};
use crate::key::Key;
use crate::memory::{self, SecureBuffer};
use crate::salt::{self, SaltFlags, MAX_SALT_LEN, MIN_SALT_LEN};

/// Domain separation prefix for identifier hashes.
const IDENTIFIER_DOMAIN: &[u8] = b"idseal.v1.identifier";

/// Domain separation prefix for purpose derivation input.
const DERIVE_DOMAIN: &[u8] = b"idseal.v1.derive";

const FREE_OPERATION: &str = "identifier::free";
const CREATE_OPERATION: &str = "identifier::create";

/// Options for [`Identifier::create`].
#[derive(Clone, Copy, Default)]
pub struct CreateOptions<'a> {
    /// Salt length, defaulting to the context configuration.
    pub salt_length: Option<usize>,
    /// Extra entropy mixed into the salt. Never used on its own.
    pub custom_entropy: Option<&'a [u8]>,
}

/// Options for [`Identifier::derive`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DeriveOptions {
    /// KDF, defaulting to the context configuration.
    pub kdf: Option<KdfAlgorithm>,
    /// Salt length, defaulting to the context configuration.
    pub salt_length: Option<usize>,
    /// Backend cost parameters. `output_len` is always forced to the base
    /// identifier's hash size.
    pub params: Option<KdfParams>,
}

/// Salted hash identifying a principal.
pub struct Identifier {
    version: u32,
    hash: SecureBuffer,
    salt: SecureBuffer,
    freed: bool,
}

impl Identifier {
    /// Build an identifier from `data` with a fresh salt.
    ///
    /// # Errors
    ///
    /// - `IdentityError::InvalidArgument` for malformed `data` or options
    /// - `IdentityError::NotInitialized` on a disposed context
    /// - `IdentityError::CryptoFailure` if salt generation fails
    pub fn create(
        ctx: &mut IdentityContext,
        data: &IdentityData,
        options: Option<&CreateOptions<'_>>,
    ) -> Result<Self> {
        ctx.ensure_live()?;
        let normalized = data.normalize()?;
        let options = options.copied().unwrap_or_default();
        let salt_length = options.salt_length.unwrap_or(ctx.config().salt_length);
        let entropy_size = options.custom_entropy.map(<[u8]>::len);
        let salt = salt::generate(
            salt_length,
            SaltFlags::REQUIRE_QUALITY,
            options.custom_entropy,
            entropy_size,
        )?;

        let algorithm = ctx.hash_algorithm();
        let version = ctx.config().protocol_version;
        let digest = compute_hash(algorithm, salt.expose(), &normalized)?;
        let id = Self::assemble(ctx, version, digest.expose(), salt.expose())?;
        tracing::debug!(
            algorithm = algorithm.name(),
            fields = data.count(),
            "identifier created"
        );
        Ok(id)
    }

    /// Moves `hash` and `salt` into context storage. On failure every buffer
    /// already stored is released again, so the counters are unchanged.
    fn assemble(ctx: &mut IdentityContext, version: u32, hash: &[u8], salt: &[u8]) -> Result<Self> {
        let hash = ctx.store_secure(hash)?;
        let salt = match ctx.store_secure(salt) {
            Ok(salt) => salt,
            Err(err) => {
                release_stored(ctx, [hash]);
                return Err(err);
            }
        };
        if let Err(err) = ctx.increment_active() {
            release_stored(ctx, [hash, salt]);
            return Err(err);
        }
        Ok(Self {
            version,
            hash,
            salt,
            freed: false,
        })
    }

    fn ensure_live(&self) -> Result<()> {
        if self.freed {
            return Err(IdentityError::InvalidState("identifier has been freed".into()));
        }
        Ok(())
    }

    /// Check `data` (and optionally `key`) against this identifier.
    ///
    /// A supplied key is checked first; if it does not verify the result is
    /// `false` and the data hash is never computed. Mismatches are `Ok(false)`.
    ///
    /// # Errors
    ///
    /// - `IdentityError::InvalidArgument` for malformed `data`
    /// - `IdentityError::InvalidState` on a freed identifier
    /// - `IdentityError::VerificationFailed` if the identifier's hash size
    ///   does not match the context algorithm
    /// - `IdentityError::NotInitialized` on a disposed context
    pub fn verify(
        &self,
        ctx: &IdentityContext,
        key: Option<&Key>,
        data: &IdentityData,
    ) -> Result<bool> {
        ctx.ensure_live()?;
        self.ensure_live()?;
        let normalized = data.normalize()?;
        let algorithm = ctx.hash_algorithm();
        if self.hash.len() != algorithm.output_len() {
            return Err(IdentityError::VerificationFailed(format!(
                "{}-byte identifier cannot be checked with {algorithm}",
                self.hash.len()
            )));
        }

        if let Some(key) = key {
            if !key.verify(ctx, self) {
                tracing::debug!("identifier verification rejected by key");
                return Ok(false);
            }
        }

        let expected = compute_hash(algorithm, self.salt.expose(), &normalized)?;
        let matched = hash::verify_hash(expected.expose(), self.hash.expose());
        tracing::debug!(matched, "identifier verified");
        Ok(matched)
    }

    /// Derive a purpose-scoped identifier.
    ///
    /// The KDF input is `domain ‖ self.hash ‖ purpose` with a fresh salt, so
    /// two derivations never share output and neither reveals the base hash.
    ///
    /// # Errors
    ///
    /// - `IdentityError::InvalidArgument` for an empty purpose or bad options
    /// - `IdentityError::InvalidState` on a freed identifier
    /// - `IdentityError::NotInitialized` on a disposed context
    pub fn derive(
        &self,
        ctx: &mut IdentityContext,
        purpose: &str,
        options: Option<&DeriveOptions>,
    ) -> Result<Self> {
        ctx.ensure_live()?;
        self.ensure_live()?;
        if purpose.is_empty() {
            return Err(IdentityError::InvalidArgument("purpose must not be empty".into()));
        }
        let options = options.copied().unwrap_or_default();
        let algorithm = options.kdf.unwrap_or_else(|| ctx.kdf_algorithm());
        let salt_length = options.salt_length.unwrap_or(ctx.config().salt_length);
        let params = options
            .params
            .unwrap_or_else(|| KdfParams::for_algorithm(algorithm))
            .with_output_len(self.hash.len());

        let salt = salt::generate(salt_length, SaltFlags::REQUIRE_QUALITY, None, None)?;
        let mut input = Zeroizing::new(Vec::new());
        input.extend_from_slice(DERIVE_DOMAIN);
        input.extend_from_slice(self.hash.expose());
        input.extend_from_slice(purpose.as_bytes());
        let derived = kdf::derive_key(algorithm, &input, salt.expose(), Some(&params), HashFlags::NONE)?;

        let id = Self::assemble(ctx, self.version, derived.expose(), salt.expose())?;
        tracing::debug!(kdf = algorithm.name(), "identifier derived");
        Ok(id)
    }

    /// Canonical text form, `version<sep>base64(hash)<sep>hex(salt)`.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidState` on a freed identifier.
    pub fn encode(&self, ctx: &IdentityContext) -> Result<String> {
        self.ensure_live()?;
        let sep = ctx.separator();
        Ok(format!(
            "{}{sep}{}{sep}{}",
            self.version,
            encode_base64(self.hash.expose()),
            encode_hex(self.salt.expose())
        ))
    }

    /// Parse the canonical text form.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidFormat` if the field count is wrong, the
    /// version is not a positive decimal integer, the hash is not base64 of a
    /// supported digest length, or the salt is not hex or fails
    /// [`salt::verify`].
    pub fn decode(ctx: &mut IdentityContext, text: &str) -> Result<Self> {
        ctx.ensure_live()?;
        let fields: Vec<&str> = text.trim().split(ctx.separator()).collect();
        let [version, hash, salt] = fields.as_slice() else {
            return Err(IdentityError::InvalidFormat(format!(
                "identifier needs 3 fields, found {}",
                fields.len()
            )));
        };

        let version = parse_version(version)?;
        let hash = decode_base64(hash)?;
        if HashAlgorithm::for_output_len(hash.len()).is_none() {
            return Err(IdentityError::InvalidFormat(format!(
                "{}-byte hash matches no supported algorithm",
                hash.len()
            )));
        }
        let salt = decode_hex(salt)?;
        if salt.len() > MAX_SALT_LEN || !salt::verify(Some(&salt), MIN_SALT_LEN) {
            return Err(IdentityError::InvalidFormat(format!(
                "{}-byte salt failed validation",
                salt.len()
            )));
        }
        Self::assemble(ctx, version, &hash, &salt)
    }

    // -- accessors ----------------------------------------------------------

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Hash bytes. All zero after [`free`].
    #[must_use]
    pub fn hash(&self) -> &[u8] {
        self.hash.expose()
    }

    /// Salt bytes. All zero after [`free`].
    #[must_use]
    pub fn salt(&self) -> &[u8] {
        self.salt.expose()
    }

    #[must_use]
    pub const fn hash_size(&self) -> usize {
        self.hash.len()
    }

    #[must_use]
    pub const fn salt_size(&self) -> usize {
        self.salt.len()
    }

    #[must_use]
    pub const fn is_freed(&self) -> bool {
        self.freed
    }

    /// Swap a buffer out for zeroes of the same length.
    fn take_buffer(buffer: &mut SecureBuffer) -> SecureBuffer {
        let zeroes = SecureBuffer::wrap(vec![0u8; buffer.len()]);
        std::mem::replace(buffer, zeroes)
    }
}

/// Wipe an identifier and release it from `ctx`.
///
/// `None` is a no-op. Never fails: a double free, a tampered canary or a
/// counter underflow is reported to the context's diagnostic sink. The hash
/// and salt read as zero afterwards in every case.
pub fn free(ctx: &mut IdentityContext, identifier: Option<&mut Identifier>) {
    let Some(id) = identifier else {
        return;
    };
    if id.freed {
        ctx.report(
            FREE_OPERATION,
            &IdentityError::InvalidState("identifier freed twice".into()),
        );
        return;
    }
    id.freed = true;
    let hash = Identifier::take_buffer(&mut id.hash);
    let salt = Identifier::take_buffer(&mut id.salt);
    let results = [
        ctx.release_secure(hash),
        ctx.release_secure(salt),
        ctx.decrement_active(),
    ];
    for error in results.into_iter().filter_map(Result::err) {
        ctx.report(FREE_OPERATION, &error);
    }
    tracing::debug!("identifier freed");
}

fn release_stored<const N: usize>(ctx: &mut IdentityContext, buffers: [SecureBuffer; N]) {
    for buffer in buffers {
        if let Err(err) = ctx.release_secure(buffer) {
            ctx.report(CREATE_OPERATION, &err);
        }
    }
}

fn compute_hash(algorithm: HashAlgorithm, salt: &[u8], normalized: &[u8]) -> Result<SecureBuffer> {
    hash::hash_parts(
        algorithm,
        &[IDENTIFIER_DOMAIN, salt, normalized],
        HashFlags::NONE,
    )
}

/// Parse a positive decimal version. Signs and whitespace are rejected.
pub(crate) fn parse_version(field: &str) -> Result<u32> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentityError::InvalidFormat(format!(
            "version {field:?} is not a decimal integer"
        )));
    }
    match field.parse::<u32>() {
        Ok(0) => Err(IdentityError::InvalidFormat("version must be > 0".into())),
        Ok(version) => Ok(version),
        Err(e) => Err(IdentityError::InvalidFormat(format!("version {field:?}: {e}"))),
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.freed == other.freed
            && memory::ct_eq(self.hash.expose(), other.hash.expose())
            && memory::ct_eq(self.salt.expose(), other.salt.expose())
    }
}

impl Eq for Identifier {}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identifier")
            .field("version", &self.version)
            .field("hash", &self.hash)
            .field("salt", &self.salt)
            .field("freed", &self.freed)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
