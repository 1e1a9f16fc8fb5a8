//! Represents a bucket name, the identifier of one catalog table.

use crate::services::blob_store::{StoreError, StoreResult};
use std::fmt;

const BUCKET_NAME_MAX_LEN: usize = 64;
const RESERVED_PREFIX: &str = "sqlite_";

/// A validated bucket name.
///
/// Bucket names end up as table identifiers inside statement text, so they
/// are restricted to an allow-list before any statement is built:
/// - 1–64 characters
/// - first character is an ASCII letter
/// - remaining characters are ASCII letters, digits or `_`
/// - must not start with the catalog-reserved `sqlite_` prefix
///
/// The leading-letter rule also keeps bucket names disjoint from the
/// engine's own `__buckets` registry table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketName(String);

impl BucketName {
    /// Validate `raw` and wrap it.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let invalid = |reason: &str| StoreError::InvalidBucketName {
            name: raw.to_string(),
            reason: reason.into(),
        };

        if raw.is_empty() {
            return Err(invalid("cannot be empty"));
        }
        if raw.len() > BUCKET_NAME_MAX_LEN {
            return Err(invalid("must be at most 64 characters"));
        }
        if !raw.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(invalid("must start with an ASCII letter"));
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid(
                "allowed characters are ASCII letters, digits, and underscores",
            ));
        }
        if raw
            .get(..RESERVED_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(RESERVED_PREFIX))
        {
            return Err(invalid("the `sqlite_` prefix is reserved"));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as a quoted SQL identifier.
    ///
    /// Only ever called on validated names, which cannot contain `"`.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
