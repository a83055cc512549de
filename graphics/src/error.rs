//! Graphics error types.

use std::fmt;

use crate::types::PixelFormat;

/// Errors raised by the GPU-facing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// Compute shaders on this device cannot write buffers of the format.
    UnsupportedStorageFormat(PixelFormat),
    /// The device memory limit would be exceeded.
    OutOfMemory {
        /// Bytes asked for.
        requested: u64,
        /// Bytes left under the limit.
        available: u64,
    },
    /// An internal invariant of the layer was broken.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::UnsupportedStorageFormat(format) => {
                write!(f, "{} storage writes not supported", format.name())
            }
            Self::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "out of GPU memory: requested {requested} bytes, {available} available"
            ),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}
