//! # Error Types
//!
//! This module defines error types used throughout the etiqueta library.
//!
//! Rendering problems that only affect one element (a missing image, an
//! unknown glyph) are not errors: they are reported as
//! [`RenderWarning`](crate::render::RenderWarning)s and the render continues.

use thiserror::Error;

/// Main error type for etiqueta operations
#[derive(Debug, Error)]
pub enum EtiquetaError {
    /// The model identifier is not in the capability table
    #[error("Unknown device model: {0:#04x}")]
    UnknownModel(u8),

    /// Canvas/profile mismatch or a malformed frame
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The transfer to the label did not complete
    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferFailure),

    /// An image or glyph asset could not be loaded
    #[error("Asset unavailable: {0}")]
    Asset(String),

    /// Image processing error
    #[error("Image error: {0}")]
    Image(String),

    /// Invalid configuration or request
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server error
    #[error("Server error: {0}")]
    Server(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the pixel encoder and frame segmenter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The canvas does not have the dimensions of the target profile.
    #[error("canvas is {canvas_width}x{canvas_height}, device expects {width}x{height}")]
    DimensionMismatch {
        canvas_width: usize,
        canvas_height: usize,
        width: usize,
        height: usize,
    },

    /// Chunk size must be at least one byte.
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// A chunk payload no longer matches its checksum.
    #[error("checksum mismatch in chunk {0}")]
    ChecksumMismatch(u32),

    /// Chunks are missing or out of order.
    #[error("expected chunk {expected}, found {found}")]
    SequenceGap { expected: u32, found: u32 },

    /// A frame does not have the length the profile implies.
    #[error("frame is {actual} bytes, expected {expected}")]
    FrameLength { expected: usize, actual: usize },
}

/// Terminal failure reasons of a transfer session.
///
/// Every variant is surfaced to the caller; none of them leaves a partially
/// applied frame behind silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferFailure {
    /// The link to the device could not be established.
    #[error("could not connect: {0}")]
    ConnectError(String),

    /// The device firmware speaks a different protocol or chunk size.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// A chunk was rejected more often than the retry bound allows.
    #[error("chunk {sequence} not delivered after {attempts} attempts")]
    ChunkDeliveryExhausted { sequence: u32, attempts: u32 },

    /// A chunk no longer matches its checksum and was not sent.
    #[error("chunk {0} failed its checksum")]
    ChunkCorrupted(u32),

    /// The device disconnected mid-transfer.
    #[error("link lost")]
    LinkLost,

    /// The overall transfer deadline expired.
    #[error("transfer timed out")]
    Timeout,

    /// The transfer was cancelled (device removed, shutdown).
    #[error("transfer cancelled")]
    Cancelled,

    /// Another transfer is already live for this device.
    #[error("device {0} is busy")]
    Busy(String),
}

impl From<image::ImageError> for EtiquetaError {
    fn from(e: image::ImageError) -> Self {
        EtiquetaError::Image(e.to_string())
    }
}
