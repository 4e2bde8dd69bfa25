//! `idseal-core`: identifier, detached key and proof-of-possession engine.
//!
//! Synchronous, no I/O: file formats, configuration loading, environment
//! resolution and transport live in the layers that embed this crate.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod encoding;
pub mod hash;
pub mod kdf;
pub mod salt;

pub mod config;
pub mod context;
pub mod diagnostics;

pub mod data;
pub mod identifier;
pub mod key;
pub mod revocation;

pub mod proof;

pub use config::{ConfigOverrides, IdentityConfig, PROTOCOL_VERSION};
pub use context::{now_millis, AllocatorHooks, IdentityContext};
pub use data::IdentityData;
pub use diagnostics::{Diagnostic, DiagnosticSink, MemorySink, TracingSink};
pub use encoding::Encoding;
pub use error::{ErrorKind, IdentityError, Result};
pub use hash::{hash, hmac, verify_hash, HashAlgorithm, HashContext, HashFlags};
pub use identifier::{CreateOptions, DeriveOptions, Identifier};
pub use kdf::{derive_key, KdfAlgorithm, KdfParams};
pub use key::{Key, KeyOptions};
pub use memory::{constant_time_compare, disable_core_dumps, SecureBuffer, MAX_BUFFER_SIZE};
pub use proof::{
    create_proof, generate_challenge, verify_proof, Proof, DEFAULT_CHALLENGE_SIZE,
    MAX_CHALLENGE_SIZE, MIN_CHALLENGE_SIZE,
};
pub use revocation::{RevocationList, RevocationRecord};
pub use salt::SaltFlags;
