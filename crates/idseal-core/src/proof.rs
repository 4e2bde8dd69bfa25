//! Challenge-response proof of possession.
//!
//! The verifier issues a fresh random challenge; the holder answers with
//!
//! ```text
//! proof = HMAC(key = identifier.hash,
//!              domain ‖ H(salt_domain ‖ identifier.salt) ‖ challenge)
//! ```
//!
//! so the proof is bound to the challenge and to the identifier's full
//! secret state. The verifier recomputes the proof and compares in constant
//! time.
//!
//! This is a symmetric keyed-MAC scheme: the verifier must hold the same
//! identifier material. It reveals no secret bytes on the wire, but it is
//! **not** a zero-knowledge proof and offers no soundness or
//! zero-knowledge guarantees beyond those of the MAC.
//!
//! The protocol keeps no state between attempts. Challenge reuse is not
//! detected here; verifiers must issue a fresh challenge per attempt and
//! may bound proof age with [`Proof::verify_within`].

use std::time::Duration;

use crate::context::{now_millis, IdentityContext};
use crate::error::{IdentityError, Result};
use crate::hash::{self, HashFlags};
use crate::identifier::Identifier;
use crate::memory;

/// Smallest accepted challenge, in bytes.
pub const MIN_CHALLENGE_SIZE: usize = 16;

/// Largest challenge [`generate_challenge`] will produce, in bytes.
pub const MAX_CHALLENGE_SIZE: usize = 128;

/// Default challenge size, in bytes.
pub const DEFAULT_CHALLENGE_SIZE: usize = 32;

/// Domain separation prefix for proof MACs.
const PROOF_DOMAIN: &[u8] = b"idseal.v1.proof";

/// Domain separation prefix for the salt binding.
const SALT_BINDING_DOMAIN: &[u8] = b"idseal.v1.proof-salt";

/// Draw a fresh challenge of `size` bytes from the OS CSPRNG.
///
/// # Errors
///
/// - `IdentityError::InvalidArgument` if `size ∉ [16, 128]`
/// - `IdentityError::NotInitialized` on a disposed context
/// - `IdentityError::CryptoFailure` if the CSPRNG fails
pub fn generate_challenge(ctx: &IdentityContext, size: usize) -> Result<Vec<u8>> {
    ctx.ensure_live()?;
    if !(MIN_CHALLENGE_SIZE..=MAX_CHALLENGE_SIZE).contains(&size) {
        return Err(IdentityError::InvalidArgument(format!(
            "challenge size {size} outside [{MIN_CHALLENGE_SIZE}, {MAX_CHALLENGE_SIZE}]"
        )));
    }
    let challenge = memory::random_bytes(size)?;
    Ok(challenge.expose().to_vec())
}

/// Answer `challenge` on behalf of `identifier`.
///
/// # Errors
///
/// - `IdentityError::InvalidArgument` if the challenge is shorter than
///   [`MIN_CHALLENGE_SIZE`]
/// - `IdentityError::InvalidState` on a freed identifier
/// - `IdentityError::NotInitialized` on a disposed context
pub fn create_proof(
    ctx: &IdentityContext,
    identifier: &Identifier,
    challenge: &[u8],
) -> Result<Vec<u8>> {
    ctx.ensure_live()?;
    if challenge.len() < MIN_CHALLENGE_SIZE {
        return Err(IdentityError::InvalidArgument(format!(
            "challenge of {} bytes is below the {MIN_CHALLENGE_SIZE}-byte minimum",
            challenge.len()
        )));
    }
    if identifier.is_freed() {
        return Err(IdentityError::InvalidState("identifier has been freed".into()));
    }

    let algorithm = ctx.hash_algorithm();
    let salt_binding = hash::hash_parts(
        algorithm,
        &[SALT_BINDING_DOMAIN, identifier.salt()],
        HashFlags::NONE,
    )?;
    let mac = hash::hmac_parts(
        algorithm,
        identifier.hash(),
        &[PROOF_DOMAIN, salt_binding.expose(), challenge],
    )?;
    Ok(mac.expose().to_vec())
}

/// Check `proof` against `challenge` and `identifier`.
///
/// Returns a bare boolean: a wrong identifier, a wrong challenge and a
/// corrupted proof are indistinguishable to the caller.
#[must_use]
pub fn verify_proof(
    ctx: &IdentityContext,
    proof: &[u8],
    challenge: &[u8],
    identifier: &Identifier,
) -> bool {
    let matched = create_proof(ctx, identifier, challenge)
        .is_ok_and(|expected| memory::ct_eq(&expected, proof));
    tracing::debug!(matched, "proof checked");
    matched
}

/// A proof together with the challenge it answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    bytes: Vec<u8>,
    challenge: Vec<u8>,
    created_at: u64,
}

impl Proof {
    /// Answer `challenge` and timestamp the result.
    ///
    /// # Errors
    ///
    /// See [`create_proof`].
    pub fn create(ctx: &IdentityContext, identifier: &Identifier, challenge: &[u8]) -> Result<Self> {
        let bytes = create_proof(ctx, identifier, challenge)?;
        Ok(Self {
            bytes,
            challenge: challenge.to_vec(),
            created_at: now_millis(),
        })
    }

    /// Reassemble a proof received from the transport layer.
    #[must_use]
    pub fn from_parts(bytes: Vec<u8>, challenge: Vec<u8>, created_at: u64) -> Self {
        Self {
            bytes,
            challenge,
            created_at,
        }
    }

    /// See [`verify_proof`].
    #[must_use]
    pub fn verify(&self, ctx: &IdentityContext, identifier: &Identifier) -> bool {
        verify_proof(ctx, &self.bytes, &self.challenge, identifier)
    }

    /// [`verify`](Self::verify), additionally rejecting proofs older than
    /// `max_age` or dated in the future.
    #[must_use]
    pub fn verify_within(
        &self,
        ctx: &IdentityContext,
        identifier: &Identifier,
        max_age: Duration,
    ) -> bool {
        self.verify_within_at(ctx, identifier, max_age, now_millis())
    }

    /// [`verify_within`](Self::verify_within) against an explicit clock reading.
    #[must_use]
    pub fn verify_within_at(
        &self,
        ctx: &IdentityContext,
        identifier: &Identifier,
        max_age: Duration,
        now: u64,
    ) -> bool {
        let max_age = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
        let fresh = now
            .checked_sub(self.created_at)
            .is_some_and(|age| age <= max_age);
        // Run the MAC check regardless so stale and forged proofs cost the same.
        let valid = self.verify(ctx, identifier);
        fresh && valid
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn challenge(&self) -> &[u8] {
        &self.challenge
    }

    /// Creation time, milliseconds since the epoch.
    #[must_use]
    pub const fn created_at(&self) -> u64 {
        self.created_at
    }
}
