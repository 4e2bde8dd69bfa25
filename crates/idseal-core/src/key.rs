//! Detached verification keys.
//!
//! A key proves an identifier was issued without re-submitting the original
//! data. Its hash is `HMAC(key = identifier.salt, domain ‖ identifier.hash)`,
//! so neither the key nor the identifier hash can be recovered from the other.
//! Keys and identifiers are meant to be stored apart (`<file>` and
//! `<file>.key`); that rule is enforced by the storage layer.
//!
//! Canonical text form:
//! `version<sep>base64(hash)<sep>timestamp<sep>expiration|-` (milliseconds).

use std::fmt;
use std::time::Duration;

use crate::context::{now_millis, IdentityContext};
use crate::encoding::{decode_base64, encode_base64};
use crate::error::{IdentityError, Result};
use crate::hash::{self, HashAlgorithm};
use crate::identifier::{parse_version, Identifier};
use crate::memory::{self, SecureBuffer};
use crate::revocation::{RevocationList, RevocationRecord};

/// Domain separation prefix for key hashes.
const KEY_DOMAIN: &[u8] = b"idseal.v1.key";

/// Placeholder for "no expiry" in the canonical form.
const NO_EXPIRY: &str = "-";

/// Options for [`Key::create`].
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyOptions {
    /// Lifetime from `issued_at`. `None` means the key never expires.
    pub ttl: Option<Duration>,
    /// Issue time in milliseconds since the epoch, defaulting to now.
    pub issued_at: Option<u64>,
}

fn duration_millis(duration: Duration) -> Result<u64> {
    u64::try_from(duration.as_millis())
        .map_err(|_| IdentityError::InvalidArgument("duration overflows milliseconds".into()))
}

/// Detached key for an [`Identifier`].
pub struct Key {
    version: u32,
    hash: SecureBuffer,
    timestamp: u64,
    expiration_time: Option<u64>,
    freed: bool,
}

impl Key {
    /// Issue a key for `identifier`.
    ///
    /// # Errors
    ///
    /// - `IdentityError::InvalidState` on a freed identifier
    /// - `IdentityError::InvalidArgument` if `issued_at + ttl` overflows
    /// - `IdentityError::NotInitialized` on a disposed context
    pub fn create(
        ctx: &IdentityContext,
        identifier: &Identifier,
        options: Option<&KeyOptions>,
    ) -> Result<Self> {
        ctx.ensure_live()?;
        if identifier.is_freed() {
            return Err(IdentityError::InvalidState("identifier has been freed".into()));
        }
        let options = options.copied().unwrap_or_default();
        let timestamp = options.issued_at.unwrap_or_else(now_millis);
        let expiration_time = options
            .ttl
            .map(|ttl| {
                timestamp.checked_add(duration_millis(ttl)?).ok_or_else(|| {
                    IdentityError::InvalidArgument("expiration time overflows".into())
                })
            })
            .transpose()?;

        let hash = expected_hash(ctx.hash_algorithm(), identifier)?;
        tracing::debug!(expires = expiration_time.is_some(), "key created");
        Ok(Self {
            version: identifier.version(),
            hash,
            timestamp,
            expiration_time,
            freed: false,
        })
    }

    /// Check this key against `identifier`.
    ///
    /// `false` if the key is expired or freed, carries a different protocol
    /// version than `identifier`, or does not belong to it. Never errors.
    #[must_use]
    pub fn verify(&self, ctx: &IdentityContext, identifier: &Identifier) -> bool {
        self.verify_at(ctx, identifier, now_millis())
    }

    /// [`verify`](Self::verify) against an explicit clock reading.
    #[must_use]
    pub fn verify_at(&self, ctx: &IdentityContext, identifier: &Identifier, now: u64) -> bool {
        if self.freed || identifier.is_freed() || self.is_expired_at(now) {
            return false;
        }
        if self.version != identifier.version() {
            return false;
        }
        if ctx.ensure_live().is_err() {
            return false;
        }
        expected_hash(ctx.hash_algorithm(), identifier)
            .is_ok_and(|expected| memory::ct_eq(expected.expose(), self.hash.expose()))
    }

    /// [`verify`](Self::verify), additionally rejecting keys listed in `revoked`.
    #[must_use]
    pub fn verify_unrevoked(
        &self,
        ctx: &IdentityContext,
        identifier: &Identifier,
        revoked: &RevocationList,
    ) -> bool {
        self.verify(ctx, identifier) && !revoked.is_revoked(ctx, self)
    }

    /// `true` once the expiration time has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// `true` if the key had expired at `now` (strictly after expiration).
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expiration_time.is_some_and(|expiration| expiration < now)
    }

    /// Copy of this key with the expiration pushed back by `extension`.
    ///
    /// A key without expiry is returned unchanged. Expired keys cannot be
    /// renewed; issue a new key from the identifier instead.
    ///
    /// # Errors
    ///
    /// - `IdentityError::InvalidState` if the key is expired or freed
    /// - `IdentityError::InvalidArgument` if the new expiration overflows
    pub fn renew(&self, extension: Duration) -> Result<Self> {
        self.renew_at(extension, now_millis())
    }

    /// [`renew`](Self::renew) against an explicit clock reading.
    ///
    /// # Errors
    ///
    /// See [`renew`](Self::renew).
    pub fn renew_at(&self, extension: Duration, now: u64) -> Result<Self> {
        self.ensure_live()?;
        if self.is_expired_at(now) {
            return Err(IdentityError::InvalidState(
                "key has expired and cannot be renewed".into(),
            ));
        }
        let extension = duration_millis(extension)?;
        let expiration_time = self
            .expiration_time
            .map(|expiration| {
                expiration.checked_add(extension).ok_or_else(|| {
                    IdentityError::InvalidArgument("expiration time overflows".into())
                })
            })
            .transpose()?;
        Ok(Self {
            version: self.version,
            hash: SecureBuffer::from_slice(self.hash.expose())?,
            timestamp: self.timestamp,
            expiration_time,
            freed: false,
        })
    }

    /// Produce an audit record for revoking this key.
    ///
    /// The key itself stays usable; enforcement is up to callers consulting
    /// a [`RevocationList`].
    ///
    /// # Errors
    ///
    /// - `IdentityError::InvalidArgument` for a blank reason
    /// - `IdentityError::InvalidState` on a freed key
    pub fn revoke(&self, ctx: &IdentityContext, reason: &str) -> Result<RevocationRecord> {
        self.ensure_live()?;
        RevocationRecord::new(ctx, self, reason, now_millis())
    }

    /// Canonical text form.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidState` on a freed key.
    pub fn encode(&self, ctx: &IdentityContext) -> Result<String> {
        self.ensure_live()?;
        let sep = ctx.separator();
        let expiration = self
            .expiration_time
            .map_or_else(|| NO_EXPIRY.to_owned(), |e| e.to_string());
        Ok(format!(
            "{}{sep}{}{sep}{}{sep}{expiration}",
            self.version,
            encode_base64(self.hash.expose()),
            self.timestamp,
        ))
    }

    /// Parse the canonical text form.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidFormat` if the field count is wrong, the
    /// version or timestamps are not decimal integers, the hash is not base64
    /// of a supported digest length, or the expiration precedes the timestamp.
    pub fn decode(ctx: &IdentityContext, text: &str) -> Result<Self> {
        ctx.ensure_live()?;
        let fields: Vec<&str> = text.trim().split(ctx.separator()).collect();
        let [version, hash, timestamp, expiration] = fields.as_slice() else {
            return Err(IdentityError::InvalidFormat(format!(
                "key needs 4 fields, found {}",
                fields.len()
            )));
        };

        let version = parse_version(version)?;
        let hash = decode_base64(hash)?;
        if HashAlgorithm::for_output_len(hash.len()).is_none() {
            return Err(IdentityError::InvalidFormat(format!(
                "{}-byte key hash matches no supported algorithm",
                hash.len()
            )));
        }
        let timestamp = parse_millis(timestamp)?;
        let expiration_time = if *expiration == NO_EXPIRY {
            None
        } else {
            Some(parse_millis(expiration)?)
        };
        if expiration_time.is_some_and(|e| e < timestamp) {
            return Err(IdentityError::InvalidFormat(
                "expiration precedes issue time".into(),
            ));
        }

        Ok(Self {
            version,
            hash: SecureBuffer::from_slice(&hash)?,
            timestamp,
            expiration_time,
            freed: false,
        })
    }

    fn ensure_live(&self) -> Result<()> {
        if self.freed {
            return Err(IdentityError::InvalidState("key has been freed".into()));
        }
        Ok(())
    }

    // -- accessors ----------------------------------------------------------

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Key hash bytes. All zero after [`free`].
    #[must_use]
    pub fn hash(&self) -> &[u8] {
        self.hash.expose()
    }

    /// Issue time, milliseconds since the epoch.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[must_use]
    pub const fn expiration_time(&self) -> Option<u64> {
        self.expiration_time
    }

    #[must_use]
    pub const fn is_freed(&self) -> bool {
        self.freed
    }
}

/// Best-effort wipe of a key. `None` and already-freed keys are ignored.
pub fn free(key: Option<&mut Key>) {
    let Some(key) = key else {
        return;
    };
    if key.freed {
        return;
    }
    key.hash.wipe();
    key.freed = true;
}

fn expected_hash(algorithm: HashAlgorithm, identifier: &Identifier) -> Result<SecureBuffer> {
    hash::hmac_parts(algorithm, identifier.salt(), &[KEY_DOMAIN, identifier.hash()])
}

fn parse_millis(field: &str) -> Result<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentityError::InvalidFormat(format!(
            "timestamp {field:?} is not a decimal integer"
        )));
    }
    field
        .parse()
        .map_err(|e| IdentityError::InvalidFormat(format!("timestamp {field:?}: {e}")))
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.timestamp == other.timestamp
            && self.expiration_time == other.expiration_time
            && self.freed == other.freed
            && memory::ct_eq(self.hash.expose(), other.hash.expose())
    }
}

impl Eq for Key {}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("version", &self.version)
            .field("hash", &self.hash)
            .field("timestamp", &self.timestamp)
            .field("expiration_time", &self.expiration_time)
            .field("freed", &self.freed)
            .finish()
    }
}
