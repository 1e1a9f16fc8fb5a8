//! Represents a file (row) stored inside a bucket table.

use crate::services::blob_store::{StoreError, StoreResult};
use sqlx::FromRow;
use std::fmt;

const FILE_NAME_MAX_LEN: usize = 255;

/// A validated file name: 1–255 characters, no control characters.
///
/// File names are always bound as statement parameters, never interpolated,
/// so the only rules are the ones the column shape imposes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileName(String);

impl FileName {
    pub fn parse(raw: &str) -> StoreResult<Self> {
        if raw.is_empty() {
            return Err(StoreError::InvalidFileName("cannot be empty".into()));
        }
        if raw.chars().count() > FILE_NAME_MAX_LEN {
            return Err(StoreError::InvalidFileName(
                "must be at most 255 characters".into(),
            ));
        }
        if raw.chars().any(char::is_control) {
            return Err(StoreError::InvalidFileName(
                "cannot contain control characters".into(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of a bucket table.
#[derive(Clone, FromRow, Debug)]
pub struct StoredFile {
    /// Surrogate id assigned by the catalog, increasing with each insert.
    pub id: i64,

    /// Name supplied at upload time. Not unique within a bucket.
    pub file_name: String,

    /// Raw payload. The column is nullable; NULL reads back as empty.
    pub file_data: Option<Vec<u8>>,
}

impl StoredFile {
    pub fn into_bytes(self) -> Vec<u8> {
        self.file_data.unwrap_or_default()
    }
}
