//! Persistence of ground-truth images
//!
//! Encoding and disk I/O run on a dedicated worker pool so the producer
//! thread never blocks on the filesystem. Failures surface asynchronously on
//! the pool's outcome channel; the frame that triggered them has long since
//! returned.

pub mod image_writer;

pub use image_writer::{ImageWriteQueue, ImageWriterPool, WriteOutcome, WriterStats};

use std::path::PathBuf;

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors that can occur while encoding or writing annotation images
#[derive(Debug)]
pub enum PersistenceError {
    IoError(std::io::Error),
    EncodeError(String),
    QueueClosed,
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::IoError(e) => write!(f, "IO error: {}", e),
            PersistenceError::EncodeError(e) => write!(f, "Encode error: {}", e),
            PersistenceError::QueueClosed => write!(f, "Write queue is closed"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::IoError(err)
    }
}

impl From<image::ImageError> for PersistenceError {
    fn from(err: image::ImageError) -> Self {
        PersistenceError::EncodeError(err.to_string())
    }
}

/// One-shot write order for a completed readback.
///
/// Owns a copy of the pixel buffer; consumed exactly once by the worker
/// pool, which releases the buffer after encoding.
#[derive(Debug)]
pub struct AsyncWriteRequest {
    /// Tightly packed RGBA8 pixels, row-major.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Absolute destination path. Parent directories are created on demand.
    pub path: PathBuf,
}
