//! Error types for the Open Protocol wire format.
//!
//! Codec errors are deliberately narrow: stream-level corruption never
//! surfaces as an error (the stream parser drops bytes and resynchronizes),
//! so these variants only appear when a caller hands the header codec a
//! malformed slice directly.

use thiserror::Error;

/// Errors produced while parsing or building a message header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header slice was not exactly 20 bytes.
    #[error("header must be exactly {expected} bytes, got {actual}")]
    HeaderLength {
        /// Required header size.
        expected: usize,
        /// Size of the slice that was provided.
        actual: usize,
    },

    /// Header contained a non-ASCII byte.
    #[error("header contains non-ASCII byte {byte:#04x} at offset {offset}")]
    NonAscii {
        /// Offending byte value.
        byte: u8,
        /// Offset within the 20-byte header.
        offset: usize,
    },

    /// The 4-character length field was not all decimal digits.
    #[error("length field is not numeric: {0:?}")]
    InvalidLength(String),
}

/// Convenience alias for codec results.
pub type Result<T> = std::result::Result<T, ProtocolError>;
