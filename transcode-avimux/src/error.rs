//! Error types for the AVI writer and inspector

use std::io;
use thiserror::Error;

/// Result type for AVI operations
pub type Result<T> = std::result::Result<T, AviError>;

/// Errors that can occur while writing or inspecting AVI files
#[derive(Error, Debug)]
pub enum AviError {
    /// IO error during read/write/seek
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Caller supplied an argument the writer cannot use
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No free slot left in a stream's super index
    #[error("Super index for stream {stream} is full ({capacity} pages)")]
    SuperIndexFull {
        /// Chunk id of the stream whose index is full
        stream: String,
        /// Number of slots reserved in the header
        capacity: u32,
    },

    /// A value does not fit the 32-bit field it must be stored in
    #[error("{what} does not fit in 32 bits: {value}")]
    OffsetOverflow {
        /// Which field overflowed
        what: &'static str,
        /// The offending value
        value: u64,
    },

    /// Invalid RIFF header
    #[error("Invalid RIFF header")]
    InvalidRiff,

    /// Invalid AVI signature
    #[error("Invalid AVI signature")]
    InvalidAvi,

    /// Invalid chunk structure
    #[error("Invalid chunk '{}': {message}", String::from_utf8_lossy(.id))]
    InvalidChunk {
        /// Chunk id
        id: [u8; 4],
        /// What is wrong with it
        message: String,
    },

    /// Insufficient data for operation
    #[error("Insufficient data: need {needed} bytes, have {available}")]
    InsufficientData {
        /// Bytes required
        needed: usize,
        /// Bytes present
        available: usize,
    },
}

impl AviError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        AviError::InvalidArgument(msg.into())
    }
}
