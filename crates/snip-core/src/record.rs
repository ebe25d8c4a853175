use crate::short_id::ShortId;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identity of the anonymous user that owns a record.
///
/// `OwnerId(0)` is a valid owner; it is what callers get when no identity
/// provider sits in front of the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u32);

impl OwnerId {
    pub const ANONYMOUS: OwnerId = OwnerId(0);

    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for OwnerId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored short URL.
///
/// Records are immutable once written, except for `deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortUrlRecord {
    /// Identifier generated by the store.
    pub id: ShortId,
    /// The original URL that was shortened.
    pub original_url: String,
    /// Who created the record.
    pub owner_id: OwnerId,
    /// Caller-supplied token from a batch request, if any.
    pub correlation_id: Option<String>,
    /// Soft-delete flag. A deleted record still resolves by id but must not
    /// be used for redirection.
    pub deleted: bool,
}

impl ShortUrlRecord {
    pub fn new(id: ShortId, original_url: impl Into<String>, owner_id: OwnerId) -> Self {
        Self {
            id,
            original_url: original_url.into(),
            owner_id,
            correlation_id: None,
            deleted: false,
        }
    }

    /// Returns `true` when the record can be used for redirection.
    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

/// One URL of a batch insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub original_url: String,
    pub correlation_id: Option<String>,
}

impl BatchItem {
    pub fn new(original_url: impl Into<String>, correlation_id: Option<String>) -> Self {
        Self {
            original_url: original_url.into(),
            correlation_id,
        }
    }
}

/// The identifier assigned to one [`BatchItem`], with its correlation id echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub id: ShortId,
    pub correlation_id: Option<String>,
}

/// Rejects URLs that can never be stored.
///
/// Full URL validation belongs to the caller; backends only refuse the empty
/// string so that a bad batch fails before anything is written.
pub fn ensure_storable(original_url: &str) -> crate::Result<()> {
    if original_url.trim().is_empty() {
        return Err(crate::StorageError::InvalidArgument(
            "original url cannot be empty".to_string(),
        ));
    }
    Ok(())
}
