//! GPU buffer resource.

use std::sync::{Arc, Weak};

use crate::device::GraphicsDevice;
use crate::types::{BufferDescriptor, PixelFormat};

/// Process-unique identity of a [`Buffer`].
///
/// Ids are never reused, so a recorded command that names a buffer id can be
/// checked against the set of buffers alive at any later point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u64);

impl BufferId {
    /// Raw numeric value, for logs.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] and are
/// reference-counted. Dropping the last `Arc` frees the allocation.
///
/// # Example
///
/// ```ignore
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::STORAGE))?;
/// println!("{} is {} bytes", buffer.id(), buffer.size());
/// ```
pub struct Buffer {
    id: BufferId,
    device: Weak<GraphicsDevice>,
    descriptor: BufferDescriptor,
}

impl Buffer {
    /// Create a new buffer (called by GraphicsDevice).
    pub(crate) fn new(id: BufferId, device: Weak<GraphicsDevice>, descriptor: BufferDescriptor) -> Self {
        Self {
            id,
            device,
            descriptor,
        }
    }

    /// Get the buffer identity.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Get the parent device, if it still exists.
    pub fn device(&self) -> Option<Arc<GraphicsDevice>> {
        self.device.upgrade()
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Element format for typed buffers.
    pub fn format(&self) -> Option<PixelFormat> {
        self.descriptor.format
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        log::trace!(
            "Buffer: released {} {:?}, size={}",
            self.id,
            self.descriptor.label,
            self.descriptor.size
        );
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    #[test]
    fn test_buffer_debug() {
        let desc = BufferDescriptor::new(1024, BufferUsage::STORAGE);
        let buffer = Buffer::new(BufferId(3), Weak::new(), desc);
        let debug = format!("{:?}", buffer);
        assert!(debug.contains("Buffer"));
        assert!(debug.contains("1024"));
    }

    #[test]
    fn test_buffer_accessors() {
        let desc = BufferDescriptor::typed(PixelFormat::Rgba8Snorm, 10, BufferUsage::STORAGE);
        let buffer = Buffer::new(BufferId(9), Weak::new(), desc);
        assert_eq!(buffer.size(), 40);
        assert_eq!(buffer.id().to_string(), "buf#9");
        assert_eq!(buffer.format(), Some(PixelFormat::Rgba8Snorm));
        assert!(buffer.device().is_none());
    }
}
