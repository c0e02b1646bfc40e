//! Keys and key metadata.
//!
//! Keys form a flat namespace. `/` carries meaning only for listing, where a
//! non-recursive listing stops at the first path segment after the prefix.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Hierarchy delimiter used by prefix listing.
pub const DELIMITER: char = '/';

/// Metadata about a stored key, derived from a single row read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub key: String,
    /// Backend clock at the last write.
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    /// Length of the stored content in bytes.
    pub size: u64,
    /// Always `true`: every stored key is a leaf, there are no directory entries.
    pub is_terminal: bool,
}

/// Reject keys that cannot name a record or lock.
pub fn validate_key(key: &str) -> crate::Result<()> {
    if key.is_empty() {
        return Err(crate::Error::InvalidKey("key must not be empty".to_string()));
    }
    if key.contains('\0') {
        return Err(crate::Error::InvalidKey(
            "key must not contain NUL bytes".to_string(),
        ));
    }
    Ok(())
}

/// Whether `key` belongs in a listing of `prefix`.
///
/// A recursive listing accepts every key starting with `prefix`. A
/// non-recursive one accepts a key only if the remainder after `prefix`,
/// ignoring a single leading delimiter, holds no further delimiter.
pub fn in_listing(prefix: &str, key: &str, recursive: bool) -> bool {
    let Some(rest) = key.strip_prefix(prefix) else {
        return false;
    };
    if recursive {
        return true;
    }
    let rest = rest.strip_prefix(DELIMITER).unwrap_or(rest);
    !rest.contains(DELIMITER)
}
