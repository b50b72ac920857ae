//! Cache key definitions.
//!
//! A [`CacheKey`] is the ordered list of key parts naming a producer,
//! followed by one part holding the canonical encoding of the call
//! arguments.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator used when a key is rendered for logs.
const DISPLAY_SEPARATOR: &str = "::";

/// Identifies one cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    parts: Vec<String>,
}

impl CacheKey {
    /// Build a key from producer key parts only.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a key from producer key parts and the call arguments.
    ///
    /// Arguments are encoded as compact JSON after conversion to a
    /// `serde_json::Value`, which orders object keys. Two argument values
    /// that serialize to equal JSON address the same slot.
    pub fn with_args<S, A>(parts: &[S], args: &A) -> Result<Self, serde_json::Error>
    where
        S: AsRef<str>,
        A: Serialize + ?Sized,
    {
        let encoded = canonical_json(args)?;
        let mut key_parts = Vec::with_capacity(parts.len() + 1);
        key_parts.extend(parts.iter().map(|part| part.as_ref().to_string()));
        key_parts.push(encoded);
        Ok(Self { parts: key_parts })
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join(DISPLAY_SEPARATOR))
    }
}

/// Stable JSON encoding of a value.
pub fn canonical_json<A: Serialize + ?Sized>(value: &A) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&value)
}
