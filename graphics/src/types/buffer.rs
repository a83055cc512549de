//! Buffer types and descriptors.

use bitflags::bitflags;

use super::PixelFormat;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be bound as a vertex stream.
        const VERTEX = 1 << 0;
        /// Buffer can be read in shaders (typed or structured SRV).
        const SHADER_READ = 1 << 1;
        /// Buffer can be written from compute shaders (UAV).
        const STORAGE = 1 << 2;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 3;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 4;
        /// Buffer is mappable for CPU readback.
        const MAP_READ = 1 << 5;
        /// Buffer is visible to ray-tracing geometry builds.
        const ACCELERATION_STRUCTURE_INPUT = 1 << 6;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a buffer.
///
/// `format` is set for typed buffers (viewed as an array of texels) and
/// left `None` for raw byte buffers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Element format of a typed buffer.
    pub format: Option<PixelFormat>,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            format: None,
        }
    }

    /// Create a typed buffer holding `elements` texels of `format`.
    pub fn typed(format: PixelFormat, elements: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size: format.block_bytes() as u64 * elements,
            usage,
            format: Some(format),
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
