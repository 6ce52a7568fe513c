//! Error types for attestation encoding

use thiserror::Error;

/// Attestation encoding and decoding errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// A declared length disagrees with the data it describes, or the
    /// data does not fit the wire field
    #[error("Invalid length")]
    InvalidLength,

    /// The flags byte requires a field that is missing
    #[error("Invalid state")]
    InvalidState,

    /// CBOR serialization failed
    #[error("CBOR encoding failed")]
    Cbor,
}

/// Result type alias for attestation operations
pub type Result<T> = std::result::Result<T, EncodeError>;
