//! The crate's stable error taxonomy (spec §7). Callers branch on the
//! category, not the message text.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad REGF signature / not a hive at all.
    #[error("not a hive: {detail}")]
    Format { detail: String },

    /// Structural inconsistency: bad cell/HBIN bounds, negative lengths,
    /// stitching failure, or a truncated value read in strict mode.
    #[error("corrupt hive structure: {detail}")]
    Corrupt { detail: String },

    /// Payload shorter than the minimum required for the structure being
    /// decoded.
    #[error("truncated record: {detail}")]
    Truncated { detail: String },

    /// Recognized but not implemented, e.g. an unknown subkey-list tag.
    #[error("unsupported: {detail}")]
    Unsupported { detail: String },

    /// Key, value, or path not found.
    #[error("not found: {detail}")]
    NotFound { detail: String },

    /// A typed accessor was invoked against a VK of a different type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// The operation is invalid given the current state (closed reader,
    /// non-recursive delete of a non-empty key, and so on).
    #[error("invalid state: {detail}")]
    State { detail: String },

    /// A parsed field exceeded a configured sanity cap.
    #[error("sanity limit exceeded: {detail}")]
    SanityLimit { detail: String },

    /// Arithmetic would overflow while computing an offset or length.
    #[error("integer overflow: {detail}")]
    IntegerOverflow { detail: String },

    /// A slice access would escape the backing buffer.
    #[error("bounds check failed: {detail}")]
    BoundsCheck { detail: String },

    /// Internal plumbing: a `nom` parse failed below the public API.
    #[error("parse error: {detail}")]
    Nom { detail: String },

    /// Internal plumbing: an I/O error from a writer sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Error::Corrupt { detail: detail.into() }
    }

    pub fn truncated(detail: impl Into<String>) -> Self {
        Error::Truncated { detail: detail.into() }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Error::NotFound { detail: detail.into() }
    }

    pub fn sanity_limit(detail: impl Into<String>) -> Self {
        Error::SanityLimit { detail: detail.into() }
    }

    pub fn state(detail: impl Into<String>) -> Self {
        Error::State { detail: detail.into() }
    }

    pub fn bounds(detail: impl Into<String>) -> Self {
        Error::BoundsCheck { detail: detail.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::corrupt("cell straddles a bin with no header");
        assert_eq!(
            "corrupt hive structure: cell straddles a bin with no header",
            e.to_string()
        );
    }
}
