//! Text encodings used by the canonical identifier and key strings.

use data_encoding::{BASE64, HEXLOWER_PERMISSIVE};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{IdentityError, Result};

/// Output encoding for digests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Lowercase hexadecimal.
    Hex,
    /// Standard padded base64 (RFC 4648 §4).
    Base64,
}

impl Encoding {
    /// Encode `bytes` in this encoding.
    #[must_use]
    pub fn encode(self, bytes: &[u8]) -> String {
        match self {
            Self::Hex => encode_hex(bytes),
            Self::Base64 => encode_base64(bytes),
        }
    }
}

/// Lowercase hex.
#[must_use]
pub fn encode_hex(bytes: &[u8]) -> String {
    HEXLOWER_PERMISSIVE.encode(bytes)
}

/// Decode hex (either case).
///
/// # Errors
///
/// Returns `IdentityError::InvalidFormat` on odd length or non-hex characters.
pub fn decode_hex(text: &str) -> Result<Zeroizing<Vec<u8>>> {
    HEXLOWER_PERMISSIVE
        .decode(text.as_bytes())
        .map(Zeroizing::new)
        .map_err(|e| IdentityError::InvalidFormat(format!("invalid hex: {e}")))
}

/// Standard padded base64.
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode standard padded base64.
///
/// # Errors
///
/// Returns `IdentityError::InvalidFormat` if the text is not valid base64.
pub fn decode_base64(text: &str) -> Result<Zeroizing<Vec<u8>>> {
    BASE64
        .decode(text.as_bytes())
        .map(Zeroizing::new)
        .map_err(|e| IdentityError::InvalidFormat(format!("invalid base64: {e}")))
}
