//! Error types for draft operations.

use thiserror::Error;

/// Result type alias for draft operations.
pub type DraftResult<T> = Result<T, DraftError>;

/// Errors raised by writes against a draft.
///
/// Reads never fail; a stale handle simply reads as empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    /// A write happened while a view getter was running.
    #[error("cannot write `{key}` while a view is computing")]
    WriteInView {
        /// Description of the slot being written.
        key: String,
    },

    /// The draft tree has been disposed.
    #[error("draft has been disposed")]
    Disposed,

    /// The operation does not apply to this kind of container.
    #[error("expected {expected} draft, found {found}")]
    KindMismatch {
        /// The kind the operation needs.
        expected: &'static str,
        /// The draft's actual kind.
        found: &'static str,
    },

    /// The key cannot address a slot of this container.
    #[error("invalid key {key} for {kind} draft")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// The draft's kind.
        kind: &'static str,
    },

    /// A non-numeric or fractional value was written to an array length.
    #[error("invalid array length: {value}")]
    InvalidLength {
        /// The rejected value.
        value: String,
    },
}

impl DraftError {
    /// Create a write-in-view error.
    #[inline]
    pub fn write_in_view(key: impl Into<String>) -> Self {
        DraftError::WriteInView { key: key.into() }
    }

    /// Create a kind mismatch error.
    #[inline]
    pub fn kind_mismatch(expected: &'static str, found: &'static str) -> Self {
        DraftError::KindMismatch { expected, found }
    }

    /// Create an invalid key error.
    #[inline]
    pub fn invalid_key(key: impl ToString, kind: &'static str) -> Self {
        DraftError::InvalidKey {
            key: key.to_string(),
            kind,
        }
    }
}
