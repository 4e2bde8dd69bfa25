//! Key revocation records.
//!
//! Revocation is advisory: [`Key::revoke`] produces an auditable
//! [`RevocationRecord`] but never alters the key. Callers that enforce
//! revocation keep a [`RevocationList`] and use
//! [`Key::verify_unrevoked`](crate::key::Key::verify_unrevoked).
//!
//! Records carry a fingerprint of the key hash, never the hash itself, so
//! audit logs can be shared without handing out working keys. Fingerprints
//! are always SHA-256, whatever the context's hash algorithm, so a list
//! written under one configuration still matches under another.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::context::IdentityContext;
use crate::encoding::encode_hex;
use crate::error::{IdentityError, Result};
use crate::hash::{self, HashAlgorithm, HashFlags};
use crate::key::Key;

/// Domain separation prefix for key fingerprints.
const FINGERPRINT_DOMAIN: &[u8] = b"idseal.v1.revocation";

const FINGERPRINT_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// Maximum number of records a [`RevocationList`] holds.
pub const MAX_REVOCATIONS: usize = 10_000;

/// Maximum reason length in bytes.
pub const MAX_REASON_LEN: usize = 1_024;

/// Hex fingerprint identifying `key` in revocation records.
///
/// # Errors
///
/// Returns `IdentityError::NotInitialized` after the context is disposed and
/// `IdentityError::CryptoFailure` if hashing fails.
pub fn fingerprint(ctx: &IdentityContext, key: &Key) -> Result<String> {
    ctx.ensure_live()?;
    let digest = hash::hash_parts(
        FINGERPRINT_ALGORITHM,
        &[FINGERPRINT_DOMAIN, key.hash()],
        HashFlags::NONE,
    )?;
    Ok(encode_hex(digest.expose()))
}

/// Audit record of a key revocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationRecord {
    /// Hex fingerprint of the revoked key (see [`fingerprint`]).
    pub key_hash: String,
    /// Revocation time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Free-form reason supplied by the revoker.
    pub reason: String,
}

impl RevocationRecord {
    pub(crate) fn new(ctx: &IdentityContext, key: &Key, reason: &str, timestamp: u64) -> Result<Self> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(IdentityError::InvalidArgument(
                "revocation reason must not be blank".into(),
            ));
        }
        if reason.len() > MAX_REASON_LEN {
            return Err(IdentityError::InvalidArgument(format!(
                "revocation reason exceeds {MAX_REASON_LEN} bytes"
            )));
        }
        let key_hash = fingerprint(ctx, key)?;
        tracing::info!(key = %key_hash, reason, "key revoked");
        Ok(Self {
            key_hash,
            timestamp,
            reason: reason.to_owned(),
        })
    }
}

/// Caller-side registry of revoked keys.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<RevocationRecord>", into = "Vec<RevocationRecord>")]
pub struct RevocationList {
    records: Vec<RevocationRecord>,
    index: HashSet<String>,
}

impl TryFrom<Vec<RevocationRecord>> for RevocationList {
    type Error = IdentityError;

    fn try_from(records: Vec<RevocationRecord>) -> Result<Self> {
        let mut list = Self::new();
        for record in records {
            list.insert(record)?;
        }
        Ok(list)
    }
}

impl From<RevocationList> for Vec<RevocationRecord> {
    fn from(list: RevocationList) -> Self {
        list.records
    }
}

impl RevocationList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidArgument` if the key is already listed
    /// or the list holds [`MAX_REVOCATIONS`] records.
    pub fn insert(&mut self, record: RevocationRecord) -> Result<()> {
        if self.records.len() >= MAX_REVOCATIONS {
            return Err(IdentityError::InvalidArgument("revocation list is full".into()));
        }
        if self.index.contains(&record.key_hash) {
            return Err(IdentityError::InvalidArgument("key already revoked".into()));
        }
        self.index.insert(record.key_hash.clone());
        self.records.push(record);
        Ok(())
    }

    /// `true` if `key` appears in the list. A key that cannot be
    /// fingerprinted is treated as revoked.
    #[must_use]
    pub fn is_revoked(&self, ctx: &IdentityContext, key: &Key) -> bool {
        fingerprint(ctx, key).map_or(true, |fp| self.index.contains(&fp))
    }

    /// Records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[RevocationRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialise as a JSON array of records.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidFormat` if serialisation fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.records)
            .map_err(|e| IdentityError::InvalidFormat(format!("revocation list: {e}")))
    }

    /// Parse a JSON array of records.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidFormat` on malformed JSON or duplicate
    /// fingerprints.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<RevocationRecord> = serde_json::from_str(json)
            .map_err(|e| IdentityError::InvalidFormat(format!("revocation list: {e}")))?;
        Self::try_from(records).map_err(|e| IdentityError::InvalidFormat(e.to_string()))
    }
}
