//! Error types for CTAPHID framing

use thiserror::Error;

/// Frame parsing and message reassembly errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The frame is shorter than its header
    #[error("Frame shorter than its header")]
    FrameTooShort,

    /// The command byte is not a known CTAPHID command
    #[error("Unknown command byte")]
    UnknownCommand,

    /// The declared payload exceeds the maximum reassembly size
    #[error("Message exceeds the maximum message size")]
    MessageTooLarge,

    /// A continuation frame arrived out of sequence
    #[error("Continuation frame out of sequence")]
    BadSequence,

    /// A frame belongs to a different channel than the message
    #[error("Frame belongs to a different channel")]
    ChannelMismatch,

    /// An initialization frame arrived where a continuation was expected
    #[error("Unexpected initialization frame")]
    UnexpectedInitialization,

    /// A continuation frame arrived where an initialization was expected
    #[error("Unexpected continuation frame")]
    UnexpectedContinuation,

    /// The frames ended before the declared payload length
    #[error("Message ended before the declared length")]
    Truncated,
}

/// Result type alias for framing operations
pub type Result<T> = std::result::Result<T, FrameError>;
