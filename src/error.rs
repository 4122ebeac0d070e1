//! Error types.
//!
//! Only input errors are reported through [`Error`]. A missing key, member or
//! collection is an empty result, never an error. Broken internal invariants
//! (a dangling leaf reference, a member without a score bucket) panic.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Key is longer than the configured maximum.
    #[error("key length {len} exceeds maximum of {max} bytes")]
    KeyTooLong { len: usize, max: usize },

    /// Key contains a control byte.
    #[error("key contains non-printable byte {byte:#04x} at offset {offset}")]
    NonPrintableKey { byte: u8, offset: usize },

    /// Key opens a JSON-like object or array that never closes properly.
    #[error("key looks like malformed structured data")]
    MalformedStructuredKey,

    /// Score is not a number, or is NaN.
    #[error("invalid score: {0}")]
    InvalidScore(String),

    /// Scan cursor is not an unsigned 32-bit integer.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// Pattern failed to compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::InvalidPattern(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
