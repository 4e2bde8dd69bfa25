//! Structured caller data fed into identifiers.
//!
//! Values are held as [`SecretString`]s and only exposed while building the
//! normalised byte form. Normalisation trims every key and value and sorts
//! the pairs by key, so field order never changes an identifier.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::error::{IdentityError, Result};

/// Parallel `keys[]` / `values[]` input.
pub struct IdentityData {
    keys: Vec<String>,
    values: Vec<SecretString>,
}

impl IdentityData {
    /// Wrap parallel key and value lists. Validation happens on use.
    #[must_use]
    pub fn new<K, V>(keys: K, values: V) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            values: values
                .into_iter()
                .map(|v| SecretString::from(v.into()))
                .collect(),
        }
    }

    /// Build from `(key, value)` pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let (keys, values): (Vec<String>, Vec<String>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(keys, values)
    }

    /// Parse `{"keys": [...], "values": [...]}`.
    ///
    /// # Errors
    ///
    /// - `IdentityError::InvalidFormat` if `json` is not valid JSON
    /// - `IdentityError::InvalidArgument` if `keys` or `values` is missing,
    ///   not an array, or contains a non-string entry
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| IdentityError::InvalidFormat(format!("identity data JSON: {e}")))?;
        let keys = string_array(&value, "keys")?;
        let values = string_array(&value, "values")?;
        Ok(Self::new(keys, values))
    }

    /// Number of values.
    #[must_use]
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Keys as supplied (untrimmed, unsorted).
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Trim, sort by key and serialise as length-prefixed fields.
    ///
    /// Each key and value is written as a big-endian `u32` byte length
    /// followed by its UTF-8 bytes, so no pair can be confused with another
    /// split of the same text.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidArgument` if there are no keys or no
    /// values, if their counts differ, if a key is blank after trimming, or if
    /// two keys collide after trimming.
    pub fn normalize(&self) -> Result<Zeroizing<Vec<u8>>> {
        if self.keys.is_empty() {
            return Err(IdentityError::InvalidArgument("identity data has no keys".into()));
        }
        if self.values.is_empty() {
            return Err(IdentityError::InvalidArgument("identity data has no values".into()));
        }
        if self.keys.len() != self.values.len() {
            return Err(IdentityError::InvalidArgument(format!(
                "{} keys but {} values",
                self.keys.len(),
                self.values.len()
            )));
        }

        let mut pairs: Vec<(&str, &str)> = self
            .keys
            .iter()
            .zip(&self.values)
            .map(|(k, v)| (k.trim(), v.expose_secret().trim()))
            .collect();
        if let Some(position) = pairs.iter().position(|(k, _)| k.is_empty()) {
            return Err(IdentityError::InvalidArgument(format!(
                "key at position {position} is blank"
            )));
        }
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        if let Some(dup) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(IdentityError::InvalidArgument(format!(
                "duplicate key {:?}",
                dup[0].0
            )));
        }

        let mut out = Zeroizing::new(Vec::new());
        for (key, value) in pairs {
            push_field(&mut out, key)?;
            push_field(&mut out, value)?;
        }
        Ok(out)
    }
}

fn push_field(out: &mut Vec<u8>, field: &str) -> Result<()> {
    let len = u32::try_from(field.len())
        .map_err(|_| IdentityError::InvalidArgument("field longer than 4 GiB".into()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(field.as_bytes());
    Ok(())
}

fn string_array(doc: &Value, field: &str) -> Result<Vec<String>> {
    let entries = doc
        .get(field)
        .ok_or_else(|| IdentityError::InvalidArgument(format!("missing `{field}`")))?
        .as_array()
        .ok_or_else(|| IdentityError::InvalidArgument(format!("`{field}` must be an array")))?;
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            entry.as_str().map(str::to_owned).ok_or_else(|| {
                IdentityError::InvalidArgument(format!("`{field}[{i}]` is not a string"))
            })
        })
        .collect()
}

impl std::fmt::Debug for IdentityData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityData")
            .field("keys", &self.keys)
            .field("values", &format_args!("[***; {}]", self.values.len()))
            .finish()
    }
}
