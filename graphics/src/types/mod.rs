//! Common types and descriptors for GPU buffers.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! used throughout the graphics layer.

mod buffer;
mod format;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use format::PixelFormat;
