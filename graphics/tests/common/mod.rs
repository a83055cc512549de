//! Shared fixtures for graphics integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use skincache_graphics::{
    Buffer, BufferDescriptor, BufferUsage, DeviceCapabilities, GraphicsDevice, PixelFormat,
};

// ============================================================================
// Device Profiles
// ============================================================================

/// Hardware classes the skin cache has to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceProfile {
    /// Desktop GPU with async compute and ray tracing.
    Desktop,
    /// GLES-class mobile GPU: no async compute, no SNORM16 storage writes.
    Mobile,
    /// Desktop GPU with a hard 1 MB memory limit.
    Constrained,
}

impl DeviceProfile {
    pub fn capabilities(&self) -> DeviceCapabilities {
        match self {
            Self::Desktop => DeviceCapabilities {
                ray_tracing: true,
                ..Default::default()
            },
            Self::Mobile => DeviceCapabilities {
                async_compute: false,
                snorm16_storage_writes: false,
                readback_latency_frames: 3,
                ..Default::default()
            },
            Self::Constrained => DeviceCapabilities {
                memory_limit: Some(1024 * 1024),
                ..Default::default()
            },
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

pub struct TestContext {
    pub profile: DeviceProfile,
    pub device: Arc<GraphicsDevice>,
}

impl TestContext {
    pub fn new(profile: DeviceProfile) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            profile,
            device: GraphicsDevice::new(format!("{profile:?}"), profile.capabilities()),
        }
    }

    /// Raw storage buffer of `size` bytes.
    pub fn storage_buffer(&self, size: u64) -> Arc<Buffer> {
        self.device
            .create_buffer(&BufferDescriptor::new(size, BufferUsage::STORAGE))
            .expect("storage buffer")
    }

    /// Typed storage buffer of `elements` texels.
    pub fn typed_buffer(&self, format: PixelFormat, elements: u64) -> Arc<Buffer> {
        self.device
            .create_buffer(&BufferDescriptor::typed(
                format,
                elements,
                BufferUsage::STORAGE | BufferUsage::SHADER_READ,
            ))
            .expect("typed buffer")
    }

    /// Advance the device `frames` times.
    pub fn end_frames(&self, frames: u32) {
        for _ in 0..frames {
            self.device.end_frame();
        }
    }
}
