//! Context configuration and caller-supplied overrides.
//!
//! The core never reads files or the process environment. Loaders parse
//! their sources into [`ConfigOverrides`] (JSON through
//! [`ConfigOverrides::from_json`], environment pairs through
//! [`ConfigOverrides::apply_env`]) and hand the result to
//! [`IdentityContext::create`](crate::context::IdentityContext::create).

use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, Result};
use crate::hash::HashAlgorithm;
use crate::kdf::KdfAlgorithm;
use crate::salt::{DEFAULT_SALT_LEN, MAX_SALT_LEN, MIN_SALT_LEN};

/// Default field separator of canonical strings.
pub const DEFAULT_SEPARATOR: char = ':';

/// Default encoding alphabet size (base64).
pub const DEFAULT_ENCODING_SIZE: u16 = 64;

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Valid encoding alphabet sizes.
pub const ENCODING_SIZE_RANGE: std::ops::RangeInclusive<u16> = 16..=256;

/// Prefix stripped from environment variable names.
pub const ENV_PREFIX: &str = "IDSEAL_";

/// Validated context configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Salt length for new identifiers, `[16, 64]`.
    pub salt_length: usize,
    /// Field separator of canonical identifier and key strings.
    pub separator: char,
    /// Encoding alphabet size, `[16, 256]`.
    pub encoding_alphabet_size: u16,
    /// Version stamped on new identifiers, `> 0`.
    pub protocol_version: u32,
    /// Whether secure memory hardening is requested.
    pub secure_memory: bool,
    /// Hash used for identifiers, keys and proofs.
    pub hash_algorithm: HashAlgorithm,
    /// KDF used for purpose derivation.
    pub kdf_algorithm: KdfAlgorithm,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            salt_length: DEFAULT_SALT_LEN,
            separator: DEFAULT_SEPARATOR,
            encoding_alphabet_size: DEFAULT_ENCODING_SIZE,
            protocol_version: PROTOCOL_VERSION,
            secure_memory: true,
            hash_algorithm: HashAlgorithm::Sha256,
            kdf_algorithm: KdfAlgorithm::HkdfSha256,
        }
    }
}

/// Returns `true` if `c` may separate canonical string fields.
///
/// The separator must be printable and must not occur in base64, hex or
/// decimal text, or the `-` placeholder of keys without expiry.
#[must_use]
pub const fn is_valid_separator(c: char) -> bool {
    c.is_ascii_graphic() && !c.is_ascii_alphanumeric() && !matches!(c, '+' | '/' | '=' | '-')
}

impl IdentityConfig {
    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidFormat` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SALT_LEN..=MAX_SALT_LEN).contains(&self.salt_length) {
            return Err(IdentityError::InvalidFormat(format!(
                "salt_length {} outside [{MIN_SALT_LEN}, {MAX_SALT_LEN}]",
                self.salt_length
            )));
        }
        if !is_valid_separator(self.separator) {
            return Err(IdentityError::InvalidFormat(format!(
                "separator {:?} must be a printable symbol outside the base64/hex alphabets",
                self.separator
            )));
        }
        if !ENCODING_SIZE_RANGE.contains(&self.encoding_alphabet_size) {
            return Err(IdentityError::InvalidFormat(format!(
                "encoding_alphabet_size {} outside [16, 256]",
                self.encoding_alphabet_size
            )));
        }
        if self.protocol_version == 0 {
            return Err(IdentityError::InvalidFormat(
                "protocol_version must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Apply `overrides` on top of this configuration.
    ///
    /// The result is not validated; [`validate`](Self::validate) does that.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::UnsupportedAlgorithm` for unknown algorithm names.
    pub fn apply(mut self, overrides: &ConfigOverrides) -> Result<Self> {
        if let Some(v) = overrides.salt_length {
            self.salt_length = v;
        }
        if let Some(v) = overrides.separator {
            self.separator = v;
        }
        if let Some(v) = overrides.encoding_size {
            self.encoding_alphabet_size = v;
        }
        if let Some(v) = overrides.version {
            self.protocol_version = v;
        }
        if let Some(v) = overrides.secure_memory {
            self.secure_memory = v;
        }
        if let Some(name) = &overrides.algorithm {
            self.hash_algorithm = HashAlgorithm::from_name(name)?;
        }
        if let Some(name) = &overrides.kdf {
            self.kdf_algorithm = KdfAlgorithm::from_name(name)?;
        }
        Ok(self)
    }
}

/// Partial configuration supplied by an external loader.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub salt_length: Option<usize>,
    pub separator: Option<char>,
    pub encoding_size: Option<u16>,
    pub version: Option<u32>,
    pub secure_memory: Option<bool>,
    /// Hash algorithm name, resolved when applied.
    pub algorithm: Option<String>,
    /// KDF name, resolved when applied.
    pub kdf: Option<String>,
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| IdentityError::InvalidFormat(format!("{name}={value:?} is not valid")))
}

impl ConfigOverrides {
    /// Parse overrides from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidFormat` on malformed JSON or unknown keys.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| IdentityError::InvalidFormat(format!("config JSON: {e}")))
    }

    /// Layer caller-resolved environment variables on top of these overrides.
    ///
    /// Recognised names (with or without the `IDSEAL_` prefix): `SALT_LENGTH`,
    /// `SEPARATOR`, `ENCODING_SIZE`, `VERSION`, `SECURE_MEMORY`, `ALGORITHM`,
    /// `KDF`. Anything else is ignored.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidFormat` if a recognised value does not parse.
    pub fn apply_env<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in vars {
            let name = name.as_ref();
            let value = value.as_ref();
            let key = name.strip_prefix(ENV_PREFIX).unwrap_or(name);
            match key {
                "SALT_LENGTH" => self.salt_length = Some(parse_env(name, value)?),
                "ENCODING_SIZE" => self.encoding_size = Some(parse_env(name, value)?),
                "VERSION" => self.version = Some(parse_env(name, value)?),
                "SECURE_MEMORY" => self.secure_memory = Some(parse_env(name, value)?),
                "SEPARATOR" => {
                    let mut chars = value.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => self.separator = Some(c),
                        _ => {
                            return Err(IdentityError::InvalidFormat(format!(
                                "{name} must be a single character"
                            )))
                        }
                    }
                }
                "ALGORITHM" => self.algorithm = Some(value.trim().to_owned()),
                "KDF" => self.kdf = Some(value.trim().to_owned()),
                _ => {}
            }
        }
        Ok(self)
    }
}
